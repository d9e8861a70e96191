//! Ingestion, dedup and run history commands.

use console::style;
use realitytracker::config::Settings;
use realitytracker::dedup::DedupEngine;
use realitytracker::models::{ListingStatus, RunStatus};
use realitytracker::scrapers::{build_adapter, KNOWN_SOURCES};

use crate::cli::helpers::{build_engine, open_database, truncate};

/// Run one ingestion cycle for a source, then a dedup pass.
pub async fn cmd_ingest(
    settings: &Settings,
    source: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let client = settings.http_client()?;
    let max = limit.or(settings.source(source).max_listings);

    let Some(adapter) = build_adapter(source, client, max) else {
        println!(
            "{} Unknown source '{}'. Known sources: {}",
            style("✗").red(),
            source,
            KNOWN_SOURCES.join(", ")
        );
        return Ok(());
    };

    println!("{} Ingesting {}...", style("→").cyan(), style(source).bold());
    let (engine, _bus) = build_engine(settings, &ctx).await?;
    let report = engine.run_cycle(adapter.as_ref()).await?;

    println!(
        "{} Run {}: {} found, {} new, {} updated",
        style("✓").green(),
        report.run_id,
        report.counts.found,
        report.counts.new,
        report.counts.updated
    );
    if report.skipped > 0 || report.failed > 0 {
        println!(
            "  {} {} skipped, {} failed",
            style("!").yellow(),
            report.skipped,
            report.failed
        );
    }
    if report.missed > 0 {
        println!(
            "  {} not seen, {} removed",
            report.missed, report.removed
        );
    }

    let linked = DedupEngine::new(ctx).run().await?;
    if linked > 0 {
        println!("  {} Linked {} duplicates", style("✓").green(), linked);
    }
    Ok(())
}

/// Run one dedup pass over all active listings.
pub async fn cmd_dedup(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let linked = DedupEngine::new(ctx.clone()).run().await?;
    let total = ctx.listings().count_duplicates().await?;
    let active = ctx.listings().count_by_status(ListingStatus::Active).await?;

    println!(
        "{} Linked {} new duplicates ({} duplicates among {} active listings)",
        style("✓").green(),
        linked,
        total,
        active
    );
    Ok(())
}

/// Show recent ingestion runs.
pub async fn cmd_runs(settings: &Settings, source: Option<&str>, limit: i64) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let runs = ctx.runs().recent(source, limit).await?;

    if runs.is_empty() {
        println!("{} No ingestion runs yet", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Ingestion Runs").bold());
    println!("{}", "-".repeat(78));
    println!(
        "{:<6} {:<10} {:<17} {:<10} {:>6} {:>6} {:>7}  Error",
        "ID", "Source", "Started", "Status", "Found", "New", "Updated"
    );
    println!("{}", "-".repeat(78));

    for run in runs {
        let status = match run.status {
            RunStatus::Completed => style(run.status.as_str()).green(),
            RunStatus::Failed => style(run.status.as_str()).red(),
            RunStatus::Running => style(run.status.as_str()).yellow(),
        };
        println!(
            "{:<6} {:<10} {:<17} {:<10} {:>6} {:>6} {:>7}  {}",
            run.id,
            truncate(&run.source, 10),
            run.started_at.format("%Y-%m-%d %H:%M"),
            status,
            run.counts.found,
            run.counts.new,
            run.counts.updated,
            run.error.as_deref().map(|e| truncate(e, 30)).unwrap_or_default()
        );
    }

    Ok(())
}
