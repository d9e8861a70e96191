//! Portal adapters that fetch raw listing payloads and normalize them.

pub mod http_client;
pub mod idnes;
pub mod rate_limiter;
pub mod sreality;

pub use http_client::{FetchError, HttpClient, RetryPolicy};
pub use idnes::IdnesAdapter;
pub use rate_limiter::RateLimiter;
pub use sreality::SrealityAdapter;

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::NormalizedListing;

/// Ids of the adapters `build_adapter` knows.
pub const KNOWN_SOURCES: &[&str] = &["sreality", "idnes"];

/// A raw payload that cannot become a listing. The item is skipped.
#[derive(Debug, Error)]
#[error("unusable listing payload: {0}")]
pub struct ValidationGap(pub String);

/// One listing portal.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source id stored on every listing.
    fn id(&self) -> &str;

    /// Fetch every raw payload for one cycle, paginating and retrying.
    async fn fetch_all(&self) -> Result<Vec<Value>, FetchError>;

    /// Turn one raw payload into a normalized listing. Pure.
    fn normalize(&self, raw: &Value) -> Result<NormalizedListing, ValidationGap>;
}

/// Construct the adapter registered under `id`.
///
/// `max_per_category` caps listings fetched for each category of the portal.
pub fn build_adapter(
    id: &str,
    client: HttpClient,
    max_per_category: Option<usize>,
) -> Option<Arc<dyn SourceAdapter>> {
    match id {
        "sreality" => Some(Arc::new(SrealityAdapter::new(
            client,
            max_per_category.unwrap_or(sreality::DEFAULT_MAX_PER_CATEGORY),
        ))),
        "idnes" => Some(Arc::new(IdnesAdapter::new(
            client,
            max_per_category.unwrap_or(idnes::DEFAULT_MAX_PER_CATEGORY),
        ))),
        _ => None,
    }
}

static AREA_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*m[²2]").unwrap());

/// Area in m² from text such as "Prodej bytu 2+kk 54 m²".
pub(crate) fn extract_area(text: &str) -> Option<f64> {
    AREA_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_extract_area() {
        assert_eq!(extract_area("Prodej bytu 2+kk 54 m²"), Some(54.0));
        assert_eq!(extract_area("Pronájem 3+1 78m2"), Some(78.0));
        assert_eq!(extract_area("Prodej pozemku"), None);
    }

    #[test]
    fn test_build_adapter_registry() {
        let client =
            HttpClient::new(Duration::from_secs(5), RateLimiter::default(), None).unwrap();
        for id in KNOWN_SOURCES {
            let adapter = build_adapter(id, client.clone(), None).unwrap();
            assert_eq!(adapter.id(), *id);
        }
        assert!(build_adapter("bazos", client, None).is_none());
    }
}
