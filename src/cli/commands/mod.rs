//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod daemon;
mod feeds;
mod ingest;
mod init;
mod spatial;
mod subscriptions;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use realitytracker::config::{load_settings_with_options, LoadOptions};
use realitytracker::models::{PropertyKind, TransactionKind};

use super::helpers::{parse_property, parse_transaction};

#[derive(Parser)]
#[command(name = "reality")]
#[command(about = "Czech real-estate listing tracker")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory, database and zones
    Init,

    /// Run one ingestion cycle for a source, then a dedup pass
    Ingest {
        /// Source id (sreality, idnes)
        source: String,
        /// Cap on listings fetched per portal category
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Link cross-source duplicates
    Dedup,

    /// Manage zone polygons
    Zones {
        #[command(subcommand)]
        command: ZoneCommands,
    },

    /// Zone and city price benchmarks
    Benchmarks {
        #[command(subcommand)]
        command: BenchmarkCommands,
    },

    /// Resolve the reference price per m² for a city or address
    Reference {
        /// City or address, e.g. "Praha 2 - Vinohrady"
        city: String,
        /// sale or rent
        #[arg(short, long, default_value = "sale", value_parser = parse_transaction)]
        transaction: TransactionKind,
        /// Property kind used for zone medians
        #[arg(short, long, value_parser = parse_property)]
        kind: Option<PropertyKind>,
    },

    /// Refresh an external reference feed
    Feeds {
        #[command(subcommand)]
        command: FeedCommands,
    },

    /// Manage notification subscriptions
    Subscriptions {
        #[command(subcommand)]
        command: SubscriptionCommands,
    },

    /// Deliver queued notifications
    Notify {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,
    },

    /// Show recent ingestion runs
    Runs {
        /// Only runs of this source
        #[arg(short, long)]
        source: Option<String>,
        /// Number of runs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Run the scheduler and notification worker until Ctrl-C
    Daemon {
        /// Skip the startup warm-up
        #[arg(long)]
        no_warmup: bool,
    },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// Load zone polygons from GeoJSON (bundled Prague dataset by default)
    Load {
        /// GeoJSON file
        file: Option<PathBuf>,
    },
    /// Assign zones to listings that have coordinates but no zone
    Assign,
}

#[derive(Subcommand)]
enum BenchmarkCommands {
    /// Recompute all benchmarks
    Compute,
    /// List stored benchmarks
    List {
        /// zone or city
        #[arg(short, long)]
        scope: Option<String>,
    },
}

#[derive(Subcommand)]
enum FeedCommands {
    /// RealityMix Prague district prices
    Realitymix,
    /// Ministry of Finance rental price map
    MfRental {
        /// Layer URL (skips discovery from the map page)
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// List stored reference points
    List {
        /// Only points of this feed
        source: Option<String>,
    },
}

#[derive(Subcommand)]
enum SubscriptionCommands {
    /// Add a subscription filter
    Add {
        /// Delivery target (Telegram chat id)
        owner: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_property)]
        kind: Option<PropertyKind>,
        #[arg(long, value_parser = parse_transaction)]
        transaction: Option<TransactionKind>,
        /// Case-insensitive substring of the listing city
        #[arg(long)]
        city: Option<String>,
        /// Comma separated layouts, e.g. "2+kk,3+kk"
        #[arg(long)]
        layouts: Option<String>,
        #[arg(long)]
        price_min: Option<f64>,
        #[arg(long)]
        price_max: Option<f64>,
        #[arg(long)]
        area_min: Option<f64>,
        #[arg(long)]
        area_max: Option<f64>,
        /// Do not notify about new listings
        #[arg(long)]
        no_new: bool,
        /// Do not notify about price drops
        #[arg(long)]
        no_price_drop: bool,
    },
    /// List subscription filters
    List {
        /// Only filters of this owner
        owner: Option<String>,
    },
    /// Delete a subscription filter
    Remove { id: i32 },
    /// Pause or resume a subscription filter
    Toggle { id: i32 },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Ingest { source, limit } => {
            ingest::cmd_ingest(&settings, &source, limit).await
        }
        Commands::Dedup => ingest::cmd_dedup(&settings).await,
        Commands::Zones { command } => match command {
            ZoneCommands::Load { file } => spatial::cmd_zones_load(&settings, file.as_deref()).await,
            ZoneCommands::Assign => spatial::cmd_zones_assign(&settings).await,
        },
        Commands::Benchmarks { command } => match command {
            BenchmarkCommands::Compute => spatial::cmd_benchmarks_compute(&settings).await,
            BenchmarkCommands::List { scope } => {
                spatial::cmd_benchmarks_list(&settings, scope.as_deref()).await
            }
        },
        Commands::Reference {
            city,
            transaction,
            kind,
        } => spatial::cmd_reference(&settings, &city, transaction, kind).await,
        Commands::Feeds { command } => match command {
            FeedCommands::Realitymix => feeds::cmd_realitymix(&settings).await,
            FeedCommands::MfRental { endpoint } => {
                feeds::cmd_mf_rental(&settings, endpoint).await
            }
            FeedCommands::List { source } => {
                feeds::cmd_feeds_list(&settings, source.as_deref()).await
            }
        },
        Commands::Subscriptions { command } => match command {
            SubscriptionCommands::Add {
                owner,
                name,
                kind,
                transaction,
                city,
                layouts,
                price_min,
                price_max,
                area_min,
                area_max,
                no_new,
                no_price_drop,
            } => {
                let mut spec = realitytracker::models::FilterSpec::for_owner(owner);
                spec.name = name;
                spec.property_kind = kind;
                spec.transaction_kind = transaction;
                spec.city = city;
                spec.layouts = layouts
                    .as_deref()
                    .map(realitytracker::models::parse_layouts)
                    .unwrap_or_default();
                spec.price_min = price_min;
                spec.price_max = price_max;
                spec.area_min = area_min;
                spec.area_max = area_max;
                spec.notify_new = !no_new;
                spec.notify_price_drop = !no_price_drop;
                subscriptions::cmd_subscription_add(&settings, &spec).await
            }
            SubscriptionCommands::List { owner } => {
                subscriptions::cmd_subscription_list(&settings, owner.as_deref()).await
            }
            SubscriptionCommands::Remove { id } => {
                subscriptions::cmd_subscription_remove(&settings, id).await
            }
            SubscriptionCommands::Toggle { id } => {
                subscriptions::cmd_subscription_toggle(&settings, id).await
            }
        },
        Commands::Notify { once } => daemon::cmd_notify(&settings, once).await,
        Commands::Runs { source, limit } => {
            ingest::cmd_runs(&settings, source.as_deref(), limit).await
        }
        Commands::Daemon { no_warmup } => daemon::cmd_daemon(&settings, &config, !no_warmup).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_reference_flags() {
        let cli = Cli::try_parse_from([
            "reality",
            "reference",
            "Praha 2 - Vinohrady",
            "--transaction",
            "rent",
            "--kind",
            "apartment",
        ])
        .unwrap();
        match cli.command {
            Commands::Reference {
                city,
                transaction,
                kind,
            } => {
                assert_eq!(city, "Praha 2 - Vinohrady");
                assert_eq!(transaction, TransactionKind::Rent);
                assert_eq!(kind, Some(PropertyKind::Apartment));
            }
            _ => panic!("expected reference command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_transaction() {
        assert!(Cli::try_parse_from(["reality", "reference", "Brno", "-t", "lease"]).is_err());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["reality", "runs", "-v", "--data", "/tmp/r"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/r")));
    }
}
