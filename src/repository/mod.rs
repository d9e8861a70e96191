//! Repository layer for database persistence.
//!
//! All database access uses Diesel with diesel-async's SQLite wrapper.

pub mod benchmark;
pub mod context;
pub mod event_queue;
pub mod listing;
pub mod pool;
pub mod records;
pub mod reference;
pub mod run;
pub mod subscription;
pub mod util;
pub mod zone;

pub use benchmark::BenchmarkRepository;
pub use context::DbContext;
pub use event_queue::EventQueueRepository;
pub use listing::{ListingRepository, UpsertOutcome, UpsertStatus};
pub use pool::{DbError, DbPool};
pub use reference::ReferenceRepository;
pub use run::IngestionRunRepository;
pub use subscription::SubscriptionRepository;
pub use zone::ZoneRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Timestamp format stored in every TEXT time column.
///
/// Fixed-width with microseconds so lexical order matches time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
