//! Canonical listing model and the normalized record adapters produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of property being offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Apartment,
    House,
    Land,
    Commercial,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::House => "house",
            Self::Land => "land",
            Self::Commercial => "commercial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "apartment" => Some(Self::Apartment),
            "house" => Some(Self::House),
            "land" => Some(Self::Land),
            "commercial" => Some(Self::Commercial),
            _ => None,
        }
    }
}

/// Whether the listing is for sale or for rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Rent,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Rent => "rent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(Self::Sale),
            "rent" => Some(Self::Rent),
            _ => None,
        }
    }
}

/// Lifecycle status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Removed,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Removed => "removed",
            Self::Sold => "sold",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "removed" => Some(Self::Removed),
            "sold" => Some(Self::Sold),
            _ => None,
        }
    }
}

/// A listing as produced by a source adapter, before it touches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub external_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub layout: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl NormalizedListing {
    /// Minimal record with CZK currency and everything optional left empty.
    pub fn new(
        external_id: impl Into<String>,
        property_kind: PropertyKind,
        transaction_kind: TransactionKind,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            url: None,
            title: None,
            description: None,
            property_kind,
            transaction_kind,
            layout: None,
            price: None,
            currency: "CZK".to_string(),
            area_m2: None,
            rooms: None,
            latitude: None,
            longitude: None,
            city: None,
            district: None,
            address: None,
            images: Vec::new(),
            raw_payload: serde_json::Value::Null,
        }
    }
}

/// A listing stored in the canonical store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i32,
    pub source: String,
    pub external_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub layout: Option<String>,
    pub price: Option<f64>,
    pub currency: String,
    pub area_m2: Option<f64>,
    pub rooms: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zone_code: Option<i64>,
    pub zone_name: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub images: Vec<String>,
    pub raw_payload: serde_json::Value,
    pub status: ListingStatus,
    pub duplicate_of: Option<i32>,
    pub missed_runs: i32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Price per square metre, when both price and area are positive.
    pub fn price_per_m2(&self) -> Option<f64> {
        price_per_m2(self.price, self.area_m2)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

pub(crate) fn price_per_m2(price: Option<f64>, area: Option<f64>) -> Option<f64> {
    match (price, area) {
        (Some(p), Some(a)) if p > 0.0 && a > 0.0 => Some(p / a),
        _ => None,
    }
}

/// One observed price of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: i32,
    pub listing_id: i32,
    pub price: f64,
    pub price_per_m2: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
