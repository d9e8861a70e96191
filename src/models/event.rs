//! Domain events emitted by ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewListing,
    PriceDrop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewListing => "new_listing",
            Self::PriceDrop => "price_drop",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new_listing" => Some(Self::NewListing),
            "price_drop" => Some(Self::PriceDrop),
            _ => None,
        }
    }
}

/// Wire form shared by the durable queue and the broadcast topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub listing_id: i32,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,
}

impl DomainEvent {
    pub fn new_listing(listing_id: i32, source: &str) -> Self {
        Self {
            kind: EventKind::NewListing,
            listing_id,
            source: source.to_string(),
            timestamp: Utc::now(),
            old_price: None,
        }
    }

    pub fn price_drop(listing_id: i32, source: &str, old_price: f64) -> Self {
        Self {
            kind: EventKind::PriceDrop,
            listing_id,
            source: source.to_string(),
            timestamp: Utc::now(),
            old_price: Some(old_price),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_type_field() {
        let event = DomainEvent::price_drop(7, "sreality", 5_000_000.0);
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"price_drop\""));
        assert!(json.contains("\"old_price\":5000000"));

        let new = DomainEvent::new_listing(8, "idnes").to_json().unwrap();
        assert!(!new.contains("old_price"));
        assert_eq!(DomainEvent::from_json(&new).unwrap().listing_id, 8);
    }
}
