//! Initialize command.

use console::style;
use realitytracker::config::Settings;
use realitytracker::scrapers::KNOWN_SOURCES;
use realitytracker::spatial::load_zones;

use crate::cli::helpers::open_database;

/// Initialize the data directory, the database and the bundled zones.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;

    let zones = load_zones(&ctx, None).await?;
    println!("  {} Loaded {} zones", style("✓").green(), zones);

    for source in KNOWN_SOURCES {
        let source_settings = settings.source(source);
        let state = if source_settings.enabled {
            style(format!("every {} min", source_settings.interval_minutes)).green()
        } else {
            style("disabled".to_string()).yellow()
        };
        println!("  {} Source {}: {}", style("•").dim(), source, state);
    }

    println!(
        "{} Initialized realitytracker in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
