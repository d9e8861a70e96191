//! Third-party reference price feeds.

pub mod mf_rental;
pub mod realitymix;

pub use mf_rental::MfRentalFeed;
pub use realitymix::RealityMixFeed;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::ReferencePoint;
use crate::repository::{DbContext, DbError};
use crate::scrapers::FetchError;

pub const REALITYMIX_SOURCE: &str = "realitymix";
pub const MF_RENTAL_SOURCE: &str = "mf_rental";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("no data endpoint found on {0}")]
    EndpointNotFound(String),
}

/// A periodic source of reference points.
#[async_trait]
pub trait ReferenceFeed: Send + Sync {
    /// Source id the points are stored under.
    fn source(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<ReferencePoint>, FeedError>;
}

/// Store points for `source`, replacing any value for the same period.
pub async fn upsert_reference_points(
    ctx: &DbContext,
    source: &str,
    points: &[ReferencePoint],
) -> Result<usize, DbError> {
    ctx.references().upsert_points(source, points, Utc::now()).await
}

/// Fetch a feed and store what it returned.
pub async fn refresh(ctx: &DbContext, feed: &dyn ReferenceFeed) -> Result<usize, FeedError> {
    let points = feed.fetch().await?;
    if points.is_empty() {
        warn!("[{}] Feed returned no data", feed.source());
        return Ok(0);
    }
    let written = upsert_reference_points(ctx, feed.source(), &points).await?;
    info!("[{}] Stored {} reference points", feed.source(), written);
    Ok(written)
}

/// Parse a Czech-formatted number such as "132 456" or "412,5 Kč".
/// Everything from the first letter on is a unit and is ignored.
pub(crate) fn parse_czech_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .take_while(|c| !c.is_alphabetic())
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyKind, TransactionKind};
    use tempfile::tempdir;

    struct StaticFeed(Vec<ReferencePoint>);

    #[async_trait]
    impl ReferenceFeed for StaticFeed {
        fn source(&self) -> &'static str {
            REALITYMIX_SOURCE
        }

        async fn fetch(&self) -> Result<Vec<ReferencePoint>, FeedError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_czech_number() {
        assert_eq!(parse_czech_number("132 456"), Some(132_456.0));
        assert_eq!(parse_czech_number("132\u{a0}456 Kč"), Some(132_456.0));
        assert_eq!(parse_czech_number("412,5"), Some(412.5));
        assert_eq!(parse_czech_number("132 456 Kč/m2"), Some(132_456.0));
        assert_eq!(parse_czech_number("412,5 Kč/m²"), Some(412.5));
        assert_eq!(parse_czech_number("n/a"), None);
    }

    #[tokio::test]
    async fn test_refresh_stores_points() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let feed = StaticFeed(vec![ReferencePoint {
            region: "Praha 3".to_string(),
            property_kind: PropertyKind::Apartment,
            transaction_kind: TransactionKind::Sale,
            price_per_m2: 121_000.0,
            period: "2026-10".to_string(),
        }]);
        assert_eq!(refresh(&ctx, &feed).await.unwrap(), 1);
        assert_eq!(refresh(&ctx, &StaticFeed(Vec::new())).await.unwrap(), 0);
        assert_eq!(ctx.references().list(Some(REALITYMIX_SOURCE)).await.unwrap().len(), 1);
    }
}
