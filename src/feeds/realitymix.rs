//! Monthly Praha 1-10 price statistics from realitymix.centrum.cz.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use tracing::{error, info, warn};

use super::{parse_czech_number, FeedError, ReferenceFeed, REALITYMIX_SOURCE};
use crate::models::{PropertyKind, ReferencePoint, TransactionKind};
use crate::scrapers::HttpClient;

const PAGES: &[(TransactionKind, &str)] = &[
    (
        TransactionKind::Sale,
        "https://realitymix.centrum.cz/statistika-nemovitosti/byty-prodej-prumerna-cena-za-1m2-bytu.html",
    ),
    (
        TransactionKind::Rent,
        "https://realitymix.centrum.cz/statistika-nemovitosti/byty-pronajem-prumerna-cena-pronajmu-1m2-mesic.html",
    ),
];

/// Values at or below this are column headers or percentages.
const MIN_PLAUSIBLE: f64 = 100.0;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").unwrap());

/// "Praha 10" before "Praha 1" so the longer name wins.
fn district_of(location: &str) -> Option<String> {
    (1..=10)
        .rev()
        .map(|n| format!("Praha {}", n))
        .find(|name| location.contains(name.as_str()))
}

/// District rows of a statistics page. The last plausible number in a row
/// is the most recent value.
pub fn parse_price_table(
    html: &str,
    transaction_kind: TransactionKind,
    period: &str,
) -> Vec<ReferencePoint> {
    let document = Html::parse_document(html);
    let mut points = Vec::new();

    for row in document.select(&ROW) {
        let cells: Vec<String> = row
            .select(&CELL)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(region) = district_of(&cells[0]) else {
            continue;
        };
        let price = cells[1..]
            .iter()
            .rev()
            .filter_map(|c| parse_czech_number(c))
            .find(|p| *p > MIN_PLAUSIBLE);
        if let Some(price_per_m2) = price {
            points.push(ReferencePoint {
                region,
                property_kind: PropertyKind::Apartment,
                transaction_kind,
                price_per_m2,
                period: period.to_string(),
            });
        }
    }
    points
}

pub struct RealityMixFeed {
    client: HttpClient,
}

impl RealityMixFeed {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceFeed for RealityMixFeed {
    fn source(&self) -> &'static str {
        REALITYMIX_SOURCE
    }

    /// Both pages are tried; a failing page is logged and skipped.
    async fn fetch(&self) -> Result<Vec<ReferencePoint>, FeedError> {
        let period = Utc::now().format("%Y-%m").to_string();
        let mut points = Vec::new();

        for (transaction, url) in PAGES {
            match self.client.get_text(url).await {
                Ok(html) => {
                    let parsed = parse_price_table(&html, *transaction, &period);
                    if parsed.is_empty() {
                        warn!(
                            "[{}] No district rows on the {} page",
                            REALITYMIX_SOURCE,
                            transaction.as_str()
                        );
                    } else {
                        info!(
                            "[{}] Parsed {} {} districts",
                            REALITYMIX_SOURCE,
                            parsed.len(),
                            transaction.as_str()
                        );
                    }
                    points.extend(parsed);
                }
                Err(e) => error!(
                    "[{}] Fetch of {} page failed: {}",
                    REALITYMIX_SOURCE,
                    transaction.as_str(),
                    e
                ),
            }
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table>
          <tr><th>Lokalita</th><th>2026-08</th><th>2026-09</th><th>Změna</th></tr>
          <tr><td>Praha 1</td><td>198 400</td><td>201&nbsp;350</td><td>1,5</td></tr>
          <tr><td>Praha 10</td><td>108 000</td><td>109 900 Kč/m2</td><td>-</td></tr>
          <tr><td>Brno</td><td>90 000</td><td>91 000</td><td>1</td></tr>
          <tr><td>Praha 4</td><td>n/a</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parse_price_table() {
        let points = parse_price_table(PAGE, TransactionKind::Sale, "2026-10");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].region, "Praha 1");
        assert_eq!(points[0].price_per_m2, 201_350.0);
        assert_eq!(points[1].region, "Praha 10");
        assert_eq!(points[1].price_per_m2, 109_900.0);
        assert!(points.iter().all(|p| p.period == "2026-10"));
    }

    #[test]
    fn test_district_prefers_longer_name() {
        assert_eq!(district_of("Praha 10 - Strašnice").as_deref(), Some("Praha 10"));
        assert_eq!(district_of("Praha 1").as_deref(), Some("Praha 1"));
        assert_eq!(district_of("Praha-východ"), None);
    }
}
