//! Quarterly rent-per-area medians from the Ministry of Finance rental map.
//!
//! The map page embeds the ArcGIS layer it renders; we find that URL and
//! query it for every cadastral area.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use super::{FeedError, ReferenceFeed, MF_RENTAL_SOURCE};
use crate::models::{PropertyKind, ReferencePoint, TransactionKind};
use crate::scrapers::HttpClient;

pub const MAP_PAGE_URL: &str =
    "https://www.mfcr.cz/cs/rozpoctova-politika/podpora-projektoveho-rizeni/cenova-mapa";

const NAME_KEYS: &[&str] = &["NAZEV_KU", "nazev", "KU_NAZEV"];
const MEDIAN_KEYS: &[&str] = &["MEDIAN", "median_rent", "cena_median"];

static ARCGIS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(https?://[^"'\s]+/arcgis/rest/services/[^"'\s]+)"#).unwrap()
});

/// Period label for the quarter containing `now`, e.g. "2026-Q4".
pub fn quarter_period(now: DateTime<Utc>) -> String {
    format!("{}-Q{}", now.year(), (now.month() - 1) / 3 + 1)
}

/// First ArcGIS REST service URL on the map page.
pub fn discover_endpoint(html: &str) -> Option<String> {
    ARCGIS_URL
        .captures(html)
        .map(|caps| caps[1].trim_end_matches('/').to_string())
}

fn attr_number(attrs: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match attrs.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => super::parse_czech_number(s),
        _ => None,
    })
}

/// Points from an ArcGIS query response. Features without a name or a
/// positive median are skipped.
pub fn parse_features(response: &Value, period: &str) -> Vec<ReferencePoint> {
    let Some(features) = response.get("features").and_then(Value::as_array) else {
        return Vec::new();
    };

    features
        .iter()
        .filter_map(|feature| {
            let attrs = feature.get("attributes")?;
            let region = NAME_KEYS
                .iter()
                .find_map(|key| attrs.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())?;
            let median = attr_number(attrs, MEDIAN_KEYS).filter(|m| *m > 0.0)?;
            Some(ReferencePoint {
                region: region.to_string(),
                property_kind: PropertyKind::Apartment,
                transaction_kind: TransactionKind::Rent,
                price_per_m2: median,
                period: period.to_string(),
            })
        })
        .collect()
}

pub struct MfRentalFeed {
    client: HttpClient,
    /// Fixed layer URL; discovered from the map page when unset.
    endpoint: Option<String>,
}

impl MfRentalFeed {
    pub fn new(client: HttpClient, endpoint: Option<String>) -> Self {
        Self { client, endpoint }
    }

    async fn endpoint(&self) -> Result<String, FeedError> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }
        let html = self.client.get_text(MAP_PAGE_URL).await?;
        let endpoint = discover_endpoint(&html)
            .ok_or_else(|| FeedError::EndpointNotFound(MAP_PAGE_URL.to_string()))?;
        info!("[{}] Discovered endpoint {}", MF_RENTAL_SOURCE, endpoint);
        Ok(endpoint)
    }
}

#[async_trait]
impl ReferenceFeed for MfRentalFeed {
    fn source(&self) -> &'static str {
        MF_RENTAL_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<ReferencePoint>, FeedError> {
        let endpoint = self.endpoint().await?;
        let url = format!(
            "{}/query?where=1%3D1&outFields=*&f=json&returnGeometry=false",
            endpoint
        );
        let response = self.client.get_json(&url).await?;
        let points = parse_features(&response, &quarter_period(Utc::now()));
        if points.is_empty() {
            warn!(
                "[{}] Query returned no usable features; the map layer may have changed",
                MF_RENTAL_SOURCE
            );
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_quarter_period() {
        let at = |m| Utc.with_ymd_and_hms(2026, m, 15, 7, 0, 0).unwrap();
        assert_eq!(quarter_period(at(1)), "2026-Q1");
        assert_eq!(quarter_period(at(4)), "2026-Q2");
        assert_eq!(quarter_period(at(9)), "2026-Q3");
        assert_eq!(quarter_period(at(12)), "2026-Q4");
    }

    #[test]
    fn test_discover_endpoint() {
        let html = r#"<script>var layer = "https://gis.mfcr.cz/arcgis/rest/services/Najmy/MapServer/0/";</script>"#;
        assert_eq!(
            discover_endpoint(html).as_deref(),
            Some("https://gis.mfcr.cz/arcgis/rest/services/Najmy/MapServer/0")
        );
        assert!(discover_endpoint("<html>nothing here</html>").is_none());
    }

    #[test]
    fn test_parse_features_with_key_fallbacks() {
        let response = json!({
            "features": [
                {"attributes": {"NAZEV_KU": "Vinohrady", "MEDIAN": 398.5}},
                {"attributes": {"nazev": "Žižkov", "median_rent": "352"}},
                {"attributes": {"KU_NAZEV": "Karlín", "cena_median": 0}},
                {"attributes": {"MEDIAN": 300}}
            ]
        });
        let points = parse_features(&response, "2026-Q4");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].region, "Vinohrady");
        assert_eq!(points[0].price_per_m2, 398.5);
        assert_eq!(points[1].region, "Žižkov");
        assert_eq!(points[1].price_per_m2, 352.0);
        assert!(points
            .iter()
            .all(|p| p.transaction_kind == TransactionKind::Rent && p.period == "2026-Q4"));
    }
}
