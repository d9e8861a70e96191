//! Subscription management commands.

use console::style;
use realitytracker::config::Settings;
use realitytracker::models::{FilterSpec, SubscriptionFilter};

use crate::cli::helpers::{open_database, truncate};

fn range(min: Option<f64>, max: Option<f64>, unit: &str) -> String {
    match (min, max) {
        (None, None) => "any".to_string(),
        (Some(lo), None) => format!(">= {:.0} {}", lo, unit),
        (None, Some(hi)) => format!("<= {:.0} {}", hi, unit),
        (Some(lo), Some(hi)) => format!("{:.0}-{:.0} {}", lo, hi, unit),
    }
}

fn describe(filter: &SubscriptionFilter) -> String {
    let mut parts = Vec::new();
    if let Some(kind) = filter.property_kind {
        parts.push(kind.as_str().to_string());
    }
    if let Some(txn) = filter.transaction_kind {
        parts.push(txn.as_str().to_string());
    }
    if let Some(city) = &filter.city {
        parts.push(format!("city~{}", city));
    }
    if !filter.layouts.is_empty() {
        parts.push(filter.layouts.join("/"));
    }
    parts.push(format!("price {}", range(filter.price_min, filter.price_max, "CZK")));
    parts.push(format!("area {}", range(filter.area_min, filter.area_max, "m²")));
    let mut events = Vec::new();
    if filter.notify_new {
        events.push("new");
    }
    if filter.notify_price_drop {
        events.push("drop");
    }
    parts.push(format!("[{}]", events.join(",")));
    parts.join(", ")
}

/// Add a subscription filter.
pub async fn cmd_subscription_add(settings: &Settings, spec: &FilterSpec) -> anyhow::Result<()> {
    if !spec.notify_new && !spec.notify_price_drop {
        println!(
            "{} A filter with both --no-new and --no-price-drop never fires",
            style("✗").red()
        );
        return Ok(());
    }

    let ctx = open_database(settings).await?;
    let id = ctx.subscriptions().create(spec).await?;
    println!(
        "{} Added subscription {} for {}",
        style("✓").green(),
        id,
        spec.owner
    );
    Ok(())
}

/// List subscription filters.
pub async fn cmd_subscription_list(settings: &Settings, owner: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let filters = ctx.subscriptions().list(owner).await?;

    if filters.is_empty() {
        println!("{} No subscriptions", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Subscriptions").bold());
    println!("{}", "-".repeat(78));
    println!("{:<5} {:<14} {:<16} {:<7} Filter", "ID", "Owner", "Name", "State");
    println!("{}", "-".repeat(78));
    for filter in filters {
        let state = if filter.active {
            style("active").green()
        } else {
            style("paused").yellow()
        };
        println!(
            "{:<5} {:<14} {:<16} {:<7} {}",
            filter.id,
            truncate(&filter.owner, 14),
            truncate(filter.name.as_deref().unwrap_or("-"), 16),
            state,
            describe(&filter)
        );
    }
    Ok(())
}

/// Delete a subscription filter.
pub async fn cmd_subscription_remove(settings: &Settings, id: i32) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    if ctx.subscriptions().delete(id).await? {
        println!("{} Removed subscription {}", style("✓").green(), id);
    } else {
        println!("{} Subscription {} not found", style("✗").red(), id);
    }
    Ok(())
}

/// Flip a subscription between active and paused.
pub async fn cmd_subscription_toggle(settings: &Settings, id: i32) -> anyhow::Result<()> {
    let ctx = open_database(settings).await?;
    let subscriptions = ctx.subscriptions();
    let Some(filter) = subscriptions.get(id).await? else {
        println!("{} Subscription {} not found", style("✗").red(), id);
        return Ok(());
    };

    let active = !filter.active;
    subscriptions.set_active(id, active).await?;
    println!(
        "{} Subscription {} is now {}",
        style("✓").green(),
        id,
        if active { "active" } else { "paused" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use realitytracker::models::TransactionKind;

    #[test]
    fn test_describe_filter() {
        let filter = SubscriptionFilter {
            id: 1,
            owner: "42".to_string(),
            name: None,
            property_kind: None,
            transaction_kind: Some(TransactionKind::Sale),
            city: Some("Praha".to_string()),
            layouts: vec!["2+kk".to_string(), "3+kk".to_string()],
            price_min: None,
            price_max: Some(6_000_000.0),
            area_min: Some(50.0),
            area_max: None,
            notify_new: true,
            notify_price_drop: false,
            active: true,
            created_at: Utc::now(),
        };
        assert_eq!(
            describe(&filter),
            "sale, city~Praha, 2+kk/3+kk, price <= 6000000 CZK, area >= 50 m², [new]"
        );
    }
}
