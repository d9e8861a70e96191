//! Price benchmark models: own aggregates and third-party reference points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PropertyKind, TransactionKind};

/// What a benchmark row is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkScope {
    /// Keyed by zone code.
    Zone,
    /// Keyed by city name, for listings outside every zone.
    City,
}

impl BenchmarkScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::City => "city",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "zone" => Some(Self::Zone),
            "city" => Some(Self::City),
            _ => None,
        }
    }
}

/// Aggregated price-per-area statistics for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneBenchmark {
    pub scope: BenchmarkScope,
    /// Zone code (as text) or city name, depending on `scope`.
    pub scope_key: String,
    /// Zone name or city name for display.
    pub label: String,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub median_price_m2: f64,
    pub avg_price_m2: f64,
    pub sample_count: i32,
    pub computed_at: DateTime<Utc>,
}

/// A price point supplied by an external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub region: String,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub price_per_m2: f64,
    pub period: String,
}

/// A stored reference point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceBenchmark {
    pub source: String,
    pub region: String,
    pub property_kind: PropertyKind,
    pub transaction_kind: TransactionKind,
    pub price_m2: f64,
    pub period: String,
    pub fetched_at: DateTime<Utc>,
}
