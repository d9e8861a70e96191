//! Notification subscriptions and delivery markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PropertyKind, TransactionKind};

/// A stored notification filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub id: i32,
    /// Delivery target, e.g. a Telegram chat id.
    pub owner: String,
    pub name: Option<String>,
    pub property_kind: Option<PropertyKind>,
    pub transaction_kind: Option<TransactionKind>,
    /// Case-insensitive substring of the listing city.
    pub city: Option<String>,
    /// Allowed layout codes; empty means any layout.
    pub layouts: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub notify_new: bool,
    pub notify_price_drop: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields a user supplies when creating a filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub owner: String,
    pub name: Option<String>,
    pub property_kind: Option<PropertyKind>,
    pub transaction_kind: Option<TransactionKind>,
    pub city: Option<String>,
    pub layouts: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub notify_new: bool,
    pub notify_price_drop: bool,
}

impl FilterSpec {
    pub fn for_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            notify_new: true,
            notify_price_drop: true,
            ..Default::default()
        }
    }
}

/// Parse a comma separated layout list ("2+kk, 3+kk").
pub fn parse_layouts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Marker that a filter was already notified about a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub filter_id: i32,
    pub listing_id: i32,
    pub kind: super::EventKind,
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layouts() {
        assert_eq!(parse_layouts("2+kk, 3+kk,,"), vec!["2+kk", "3+kk"]);
        assert!(parse_layouts("  ").is_empty());
    }
}
