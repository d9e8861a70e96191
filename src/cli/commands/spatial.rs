//! Zone, benchmark and reference price commands.

use std::path::Path;

use console::style;
use realitytracker::config::Settings;
use realitytracker::models::{BenchmarkScope, PropertyKind, TransactionKind};
use realitytracker::spatial::{assign_zones, compute_benchmarks, load_zones, ReferenceResolver};

use crate::cli::helpers::{open_database, truncate};

/// Load zone polygons. Codes already stored are kept.
pub async fn cmd_zones_load(settings: &Settings, file: Option<&Path>) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let loaded = load_zones(&ctx, file).await?;
    let total = ctx.zones().count().await?;
    println!(
        "{} Loaded {} zones ({} stored)",
        style("✓").green(),
        loaded,
        total
    );
    Ok(())
}

/// Assign zones to listings with coordinates and no zone yet.
pub async fn cmd_zones_assign(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    if ctx.zones().count().await? == 0 {
        println!(
            "{} No zones loaded. Run 'reality zones load' first.",
            style("!").yellow()
        );
        return Ok(());
    }
    let assigned = assign_zones(&ctx).await?;
    println!("{} Assigned zones to {} listings", style("✓").green(), assigned);
    Ok(())
}

/// Recompute all benchmarks.
pub async fn cmd_benchmarks_compute(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let computed = compute_benchmarks(&ctx).await?;
    println!("{} Computed {} benchmark rows", style("✓").green(), computed);
    Ok(())
}

/// List stored benchmarks.
pub async fn cmd_benchmarks_list(settings: &Settings, scope: Option<&str>) -> anyhow::Result<()> {
    let scope = match scope {
        Some(s) => match BenchmarkScope::from_str(s) {
            Some(scope) => Some(scope),
            None => {
                println!(
                    "{} Unknown scope '{}' (expected zone or city)",
                    style("✗").red(),
                    s
                );
                return Ok(());
            }
        },
        None => None,
    };

    let ctx = open_database(settings).await?;
    let rows = ctx.benchmarks().list(scope).await?;
    if rows.is_empty() {
        println!(
            "{} No benchmarks. Run 'reality benchmarks compute' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Benchmarks (CZK/m²)").bold());
    println!("{}", "-".repeat(78));
    println!(
        "{:<5} {:<24} {:<11} {:<5} {:>10} {:>10} {:>6}",
        "Scope", "Area", "Kind", "Txn", "Median", "Mean", "N"
    );
    println!("{}", "-".repeat(78));
    for row in rows {
        println!(
            "{:<5} {:<24} {:<11} {:<5} {:>10.0} {:>10.0} {:>6}",
            row.scope.as_str(),
            truncate(&row.label, 24),
            row.property_kind.as_str(),
            row.transaction_kind.as_str(),
            row.median_price_m2,
            row.avg_price_m2,
            row.sample_count
        );
    }
    Ok(())
}

/// Resolve the reference price for a city or address.
pub async fn cmd_reference(
    settings: &Settings,
    city: &str,
    transaction: TransactionKind,
    kind: Option<PropertyKind>,
) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let resolver = ReferenceResolver::new(ctx);

    match resolver.resolve(city, transaction, kind).await {
        Some(price) => println!(
            "{} {} {}: {}",
            style("✓").green(),
            city,
            transaction.as_str(),
            style(price).bold()
        ),
        None => println!(
            "{} No reference price for '{}' ({})",
            style("!").yellow(),
            city,
            transaction.as_str()
        ),
    }
    Ok(())
}
