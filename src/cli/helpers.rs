//! Shared helper functions for CLI commands.

use std::sync::Arc;

use console::style;
use realitytracker::config::Settings;
use realitytracker::events::{BroadcastTopic, EventBus};
use realitytracker::ingest::IngestionEngine;
use realitytracker::models::{PropertyKind, TransactionKind};
use realitytracker::notify::{LogNotifier, Notifier, TelegramNotifier};
use realitytracker::repository::DbContext;

/// Truncate a string to at most `max` characters, adding an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

/// Clap value parser for `sale` / `rent`.
pub fn parse_transaction(s: &str) -> Result<TransactionKind, String> {
    TransactionKind::from_str(&s.to_lowercase())
        .ok_or_else(|| format!("unknown transaction kind '{}' (expected sale or rent)", s))
}

/// Clap value parser for property kinds.
pub fn parse_property(s: &str) -> Result<PropertyKind, String> {
    PropertyKind::from_str(&s.to_lowercase()).ok_or_else(|| {
        format!(
            "unknown property kind '{}' (expected apartment, house, land or commercial)",
            s
        )
    })
}

/// Open the database, creating the schema when missing.
pub async fn open_database(settings: &Settings) -> anyhow::Result<DbContext> {
    settings.ensure_directories()?;
    let ctx = settings.create_db_context();
    ctx.init_schema().await?;
    Ok(ctx)
}

/// Event bus for the configured backend.
pub async fn build_bus(settings: &Settings, ctx: &DbContext) -> anyhow::Result<EventBus> {
    Ok(EventBus::from_backend(&settings.event_backend, ctx, BroadcastTopic::new()).await?)
}

/// Ingestion engine publishing to the configured bus.
pub async fn build_engine(
    settings: &Settings,
    ctx: &DbContext,
) -> anyhow::Result<(IngestionEngine, EventBus)> {
    let bus = build_bus(settings, ctx).await?;
    Ok((IngestionEngine::new(ctx.clone(), Arc::new(bus.clone())), bus))
}

/// Telegram when a bot token is configured, otherwise the log.
pub fn build_notifier(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    match &settings.telegram_bot_token {
        Some(token) => Ok(Arc::new(TelegramNotifier::new(token.clone())?)),
        None => {
            println!(
                "{} TELEGRAM_BOT_TOKEN not set, notifications go to the log",
                style("!").yellow()
            );
            Ok(Arc::new(LogNotifier))
        }
    }
}
