//! Reference feed commands.

use console::style;
use realitytracker::config::Settings;
use realitytracker::feeds::{self, MfRentalFeed, RealityMixFeed, ReferenceFeed};

use crate::cli::helpers::{open_database, truncate};

async fn refresh_feed(settings: &Settings, feed: &dyn ReferenceFeed) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    println!("{} Fetching {}...", style("→").cyan(), feed.source());
    let stored = feeds::refresh(&ctx, feed).await?;
    if stored == 0 {
        println!("{} {} returned no data", style("!").yellow(), feed.source());
    } else {
        println!(
            "{} Stored {} reference points from {}",
            style("✓").green(),
            stored,
            feed.source()
        );
    }
    Ok(())
}

/// Refresh RealityMix district prices.
pub async fn cmd_realitymix(settings: &Settings) -> anyhow::Result<()> {
    let feed = RealityMixFeed::new(settings.http_client()?);
    refresh_feed(settings, &feed).await
}

/// Refresh the Ministry of Finance rental map.
pub async fn cmd_mf_rental(settings: &Settings, endpoint: Option<String>) -> anyhow::Result<()> {
    let endpoint = endpoint.or_else(|| settings.mf_rental_endpoint.clone());
    let feed = MfRentalFeed::new(settings.http_client()?, endpoint);
    refresh_feed(settings, &feed).await
}

/// List stored reference points.
pub async fn cmd_feeds_list(settings: &Settings, source: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let points = ctx.references().list(source).await?;
    if points.is_empty() {
        println!("{} No reference points stored", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Reference Points (CZK/m²)").bold());
    println!("{}", "-".repeat(72));
    println!(
        "{:<11} {:<26} {:<5} {:>10} {:<8} Fetched",
        "Source", "Region", "Txn", "Price", "Period"
    );
    println!("{}", "-".repeat(72));
    for point in points {
        println!(
            "{:<11} {:<26} {:<5} {:>10.0} {:<8} {}",
            point.source,
            truncate(&point.region, 26),
            point.transaction_kind.as_str(),
            point.price_m2,
            point.period,
            point.fetched_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}
