//! Reference price resolution.
//!
//! Tries progressively coarser sources for a city and returns the first
//! price-per-area found, labelled with where it came from:
//!
//! 1. live MF rental data for the cadastral area (rentals in Prague only)
//! 2. our own zone median with at least [`MIN_ZONE_SAMPLES`] listings
//! 3. live RealityMix data for the Prague district
//! 4. the static Prague district table
//! 5. the static regional table

use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::reference_tables::{
    cadastral_district, district_price, normalize_city, prague_district, prague_tokens,
    region_for_city, region_price, token_combinations,
};
use crate::feeds::{MF_RENTAL_SOURCE, REALITYMIX_SOURCE};
use crate::models::{PropertyKind, TransactionKind, ZoneBenchmark};
use crate::repository::{DbContext, DbError};

pub const MIN_ZONE_SAMPLES: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTier {
    LiveRental,
    ZoneMedian,
    LiveDistrict,
    StaticDistrict,
    StaticRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPrice {
    pub price_m2: f64,
    pub label: String,
    pub tier: ReferenceTier,
}

impl fmt::Display for ResolvedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} CZK/m² ({})", self.price_m2, self.label)
    }
}

/// Address tokens after "praha-", without the leading district number.
fn area_tokens(city: &str) -> Vec<String> {
    let mut tokens = prague_tokens(city).unwrap_or_default();
    let skip = tokens
        .iter()
        .take_while(|t| t.chars().all(|c| c.is_ascii_digit()))
        .count();
    tokens.drain(..skip);
    tokens
}

#[derive(Clone)]
pub struct ReferenceResolver {
    ctx: DbContext,
}

impl ReferenceResolver {
    pub fn new(ctx: DbContext) -> Self {
        Self { ctx }
    }

    /// Best reference price for `city`, or `None` when no tier knows it.
    ///
    /// A store error in one tier is logged and the next tier is tried.
    pub async fn resolve(
        &self,
        city: &str,
        transaction: TransactionKind,
        property_kind: Option<PropertyKind>,
    ) -> Option<ResolvedPrice> {
        let district = prague_district(city);

        if let Some(district) = district {
            if transaction == TransactionKind::Rent {
                match self.live_rental(city).await {
                    Ok(Some(hit)) => return Some(hit),
                    Ok(None) => {}
                    Err(e) => warn!("Rental reference lookup failed for {}: {}", city, e),
                }
            }

            match self.zone_median(city, transaction, property_kind).await {
                Ok(Some(hit)) => return Some(hit),
                Ok(None) => {}
                Err(e) => warn!("Zone median lookup failed for {}: {}", city, e),
            }

            match self.live_district(district, transaction).await {
                Ok(Some(hit)) => return Some(hit),
                Ok(None) => {}
                Err(e) => warn!("District reference lookup failed for {}: {}", city, e),
            }

            if let Some(price_m2) = district_price(district, transaction) {
                return Some(ResolvedPrice {
                    price_m2,
                    label: format!("Praha {} (Deloitte)", district),
                    tier: ReferenceTier::StaticDistrict,
                });
            }
        }

        let region = region_for_city(city)?;
        region_price(region, transaction).map(|price_m2| ResolvedPrice {
            price_m2,
            label: format!("{} (CSU)", region),
            tier: ReferenceTier::StaticRegion,
        })
    }

    async fn live_rental(&self, city: &str) -> Result<Option<ResolvedPrice>, DbError> {
        let references = self.ctx.references();
        let candidates = token_combinations(&area_tokens(city));

        for candidate in candidates
            .iter()
            .filter(|c| !c.chars().all(|ch| ch.is_ascii_digit() || ch == '-'))
        {
            if let Some(point) = references
                .latest_matching(MF_RENTAL_SOURCE, candidate, TransactionKind::Rent)
                .await?
            {
                if point.price_m2 > 0.0 {
                    return Ok(Some(ResolvedPrice {
                        price_m2: point.price_m2,
                        label: format!("{} (MF)", point.region),
                        tier: ReferenceTier::LiveRental,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn zone_median(
        &self,
        city: &str,
        transaction: TransactionKind,
        property_kind: Option<PropertyKind>,
    ) -> Result<Option<ResolvedPrice>, DbError> {
        let tokens = area_tokens(city);
        let area = token_combinations(&tokens)
            .into_iter()
            .find(|c| cadastral_district(c).is_some())
            .or_else(|| tokens.first().cloned());

        let candidates = self
            .ctx
            .benchmarks()
            .zone_candidates(transaction, property_kind, MIN_ZONE_SAMPLES)
            .await?;

        let hit: Option<ZoneBenchmark> = match area {
            Some(area) => candidates
                .into_iter()
                .find(|b| normalize_city(&b.label).contains(&area)),
            None => {
                let codes = self.ctx.listings().zone_codes_for_city(city).await?;
                candidates
                    .into_iter()
                    .find(|b| codes.iter().any(|code| code.to_string() == b.scope_key))
            }
        };

        Ok(hit
            .filter(|b| b.median_price_m2 > 0.0)
            .map(|b| ResolvedPrice {
                price_m2: b.median_price_m2,
                label: format!("{} (median, N={})", b.label, b.sample_count),
                tier: ReferenceTier::ZoneMedian,
            }))
    }

    async fn live_district(
        &self,
        district: u8,
        transaction: TransactionKind,
    ) -> Result<Option<ResolvedPrice>, DbError> {
        let region = format!("Praha {}", district);
        let point = self
            .ctx
            .references()
            .latest_exact(REALITYMIX_SOURCE, &region, transaction)
            .await?;
        Ok(point
            .filter(|p| p.price_m2 > 0.0)
            .map(|p| ResolvedPrice {
                price_m2: p.price_m2,
                label: format!("{} (RealityMix)", p.region),
                tier: ReferenceTier::LiveDistrict,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkScope, ReferencePoint};
    use chrono::Utc;
    use tempfile::{tempdir, TempDir};

    async fn setup() -> (TempDir, DbContext) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (dir, ctx)
    }

    fn point(region: &str, txn: TransactionKind, price: f64) -> ReferencePoint {
        ReferencePoint {
            region: region.to_string(),
            property_kind: PropertyKind::Apartment,
            transaction_kind: txn,
            price_per_m2: price,
            period: "2026-Q3".to_string(),
        }
    }

    #[test]
    fn test_area_tokens_skip_district_number() {
        assert_eq!(area_tokens("Praha 2 - Vinohrady"), vec!["vinohrady"]);
        assert!(area_tokens("Praha 2").is_empty());
        assert!(area_tokens("Brno").is_empty());
    }

    #[tokio::test]
    async fn test_static_tiers_without_data() {
        let (_dir, ctx) = setup().await;
        let resolver = ReferenceResolver::new(ctx);

        let prague = resolver
            .resolve("Praha 2 - Vinohrady", TransactionKind::Rent, None)
            .await
            .unwrap();
        assert_eq!(prague.price_m2, 400.0);
        assert_eq!(prague.label, "Praha 2 (Deloitte)");
        assert_eq!(prague.tier, ReferenceTier::StaticDistrict);

        let brno = resolver
            .resolve("Brno", TransactionKind::Sale, None)
            .await
            .unwrap();
        assert_eq!(brno.label, "Jihomoravsky (CSU)");
        assert_eq!(brno.price_m2, 78_000.0);

        assert!(resolver
            .resolve("Atlantida", TransactionKind::Sale, None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_live_rental_beats_static_district() {
        let (_dir, ctx) = setup().await;
        ctx.references()
            .upsert_points(
                MF_RENTAL_SOURCE,
                &[point("Vinohrady", TransactionKind::Rent, 412.0)],
                Utc::now(),
            )
            .await
            .unwrap();

        let resolved = ReferenceResolver::new(ctx)
            .resolve("Praha 2 - Vinohrady", TransactionKind::Rent, None)
            .await
            .unwrap();
        assert_eq!(resolved.tier, ReferenceTier::LiveRental);
        assert_eq!(resolved.price_m2, 412.0);
        assert_eq!(resolved.label, "Vinohrady (MF)");
    }

    #[tokio::test]
    async fn test_rental_feed_ignored_for_sales() {
        let (_dir, ctx) = setup().await;
        ctx.references()
            .upsert_points(
                MF_RENTAL_SOURCE,
                &[point("Vinohrady", TransactionKind::Rent, 412.0)],
                Utc::now(),
            )
            .await
            .unwrap();

        let resolved = ReferenceResolver::new(ctx)
            .resolve("Praha 2 - Vinohrady", TransactionKind::Sale, None)
            .await
            .unwrap();
        assert_eq!(resolved.tier, ReferenceTier::StaticDistrict);
        assert_eq!(resolved.price_m2, 155_000.0);
    }

    #[tokio::test]
    async fn test_zone_median_needs_enough_samples() {
        let (_dir, ctx) = setup().await;
        let bench = |n: i32| ZoneBenchmark {
            scope: BenchmarkScope::Zone,
            scope_key: "727415".to_string(),
            label: "Vinohrady".to_string(),
            property_kind: PropertyKind::Apartment,
            transaction_kind: TransactionKind::Sale,
            median_price_m2: 148_000.0,
            avg_price_m2: 150_000.0,
            sample_count: n,
            computed_at: Utc::now(),
        };
        let resolver = ReferenceResolver::new(ctx.clone());

        ctx.benchmarks().upsert_many(&[bench(4)]).await.unwrap();
        let resolved = resolver
            .resolve("praha-vinohrady-manesova", TransactionKind::Sale, None)
            .await
            .unwrap();
        assert_eq!(resolved.tier, ReferenceTier::StaticDistrict);

        ctx.benchmarks().upsert_many(&[bench(7)]).await.unwrap();
        let resolved = resolver
            .resolve("praha-vinohrady-manesova", TransactionKind::Sale, None)
            .await
            .unwrap();
        assert_eq!(resolved.tier, ReferenceTier::ZoneMedian);
        assert_eq!(resolved.price_m2, 148_000.0);
        assert_eq!(resolved.label, "Vinohrady (median, N=7)");
    }

    #[tokio::test]
    async fn test_live_district_feed() {
        let (_dir, ctx) = setup().await;
        ctx.references()
            .upsert_points(
                REALITYMIX_SOURCE,
                &[point("Praha 5", TransactionKind::Sale, 131_500.0)],
                Utc::now(),
            )
            .await
            .unwrap();

        let resolved = ReferenceResolver::new(ctx)
            .resolve("Praha 5", TransactionKind::Sale, None)
            .await
            .unwrap();
        assert_eq!(resolved.tier, ReferenceTier::LiveDistrict);
        assert_eq!(resolved.label, "Praha 5 (RealityMix)");
    }
}
