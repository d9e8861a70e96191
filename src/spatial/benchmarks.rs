//! Price-per-area aggregation over the active listing set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::{BenchmarkScope, PropertyKind, TransactionKind, ZoneBenchmark};
use crate::repository::listing::BenchmarkSampleRow;
use crate::repository::{DbContext, DbError};

/// Price-per-area outside this band is treated as a data error.
pub const MIN_PRICE_M2: f64 = 5_000.0;
pub const MAX_PRICE_M2: f64 = 500_000.0;
/// Groups with fewer samples are not published.
pub const MIN_SAMPLES: usize = 3;

type GroupKey = (BenchmarkScope, String, PropertyKind, TransactionKind);

/// 50th percentile with linear interpolation. `sorted` must be ascending.
pub fn median(sorted: &[f64]) -> Option<f64> {
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[n / 2]),
        n => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Group samples and compute one benchmark per group with enough data.
pub fn aggregate(samples: &[BenchmarkSampleRow], computed_at: DateTime<Utc>) -> Vec<ZoneBenchmark> {
    let mut groups: BTreeMap<GroupKey, (String, Vec<f64>)> = BTreeMap::new();

    for row in samples {
        if row.price <= 0.0 || row.area_m2 <= 0.0 {
            continue;
        }
        let price_m2 = row.price / row.area_m2;
        if !(MIN_PRICE_M2..=MAX_PRICE_M2).contains(&price_m2) {
            continue;
        }

        let (scope, key, label) = match (row.zone_code, row.city.as_deref()) {
            (Some(code), _) => (
                BenchmarkScope::Zone,
                code.to_string(),
                row.zone_name.clone().unwrap_or_else(|| code.to_string()),
            ),
            (None, Some(city)) if !city.trim().is_empty() => {
                (BenchmarkScope::City, city.to_string(), city.to_string())
            }
            _ => continue,
        };

        groups
            .entry((scope, key, row.property_kind, row.transaction_kind))
            .or_insert_with(|| (label, Vec::new()))
            .1
            .push(price_m2);
    }

    groups
        .into_iter()
        .filter_map(|((scope, scope_key, property_kind, transaction_kind), (label, mut values))| {
            if values.len() < MIN_SAMPLES {
                return None;
            }
            values.sort_by(f64::total_cmp);
            let median_price_m2 = median(&values)?.round();
            let avg_price_m2 = (values.iter().sum::<f64>() / values.len() as f64).round();
            Some(ZoneBenchmark {
                scope,
                scope_key,
                label,
                property_kind,
                transaction_kind,
                median_price_m2,
                avg_price_m2,
                sample_count: values.len() as i32,
                computed_at,
            })
        })
        .collect()
}

/// Recompute and store all benchmarks. Returns the number of groups written.
pub async fn compute_benchmarks(ctx: &DbContext) -> Result<usize, DbError> {
    let samples = ctx.listings().benchmark_samples().await?;
    let benchmarks = aggregate(&samples, Utc::now());
    let written = ctx.benchmarks().upsert_many(&benchmarks).await?;
    info!(
        "Computed {} benchmarks from {} samples",
        written,
        samples.len()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(zone: Option<i64>, city: Option<&str>, price: f64, area: f64) -> BenchmarkSampleRow {
        BenchmarkSampleRow {
            zone_code: zone,
            zone_name: zone.map(|_| "Vinohrady".to_string()),
            city: city.map(str::to_string),
            property_kind: PropertyKind::Apartment,
            transaction_kind: TransactionKind::Sale,
            price,
            area_m2: area,
        }
    }

    #[test]
    fn test_median_interpolates() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[1.0, 3.0, 8.0]), Some(3.0));
        assert_eq!(median(&[1.0, 3.0, 5.0, 8.0]), Some(4.0));
    }

    #[test]
    fn test_two_samples_publish_nothing() {
        let rows = vec![
            sample(Some(727415), None, 6_000_000.0, 50.0),
            sample(Some(727415), None, 7_000_000.0, 50.0),
        ];
        assert!(aggregate(&rows, Utc::now()).is_empty());
    }

    #[test]
    fn test_three_samples_publish_one_row() {
        let rows = vec![
            sample(Some(727415), None, 6_000_000.0, 50.0),
            sample(Some(727415), None, 7_000_000.0, 50.0),
            sample(Some(727415), None, 5_000_000.0, 50.0),
        ];
        let out = aggregate(&rows, Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scope, BenchmarkScope::Zone);
        assert_eq!(out[0].scope_key, "727415");
        assert_eq!(out[0].label, "Vinohrady");
        assert_eq!(out[0].median_price_m2, 120_000.0);
        assert_eq!(out[0].avg_price_m2, 120_000.0);
        assert_eq!(out[0].sample_count, 3);
    }

    #[test]
    fn test_out_of_band_values_are_dropped() {
        let rows = vec![
            sample(Some(1), None, 6_000_000.0, 50.0),
            sample(Some(1), None, 7_000_000.0, 50.0),
            sample(Some(1), None, 100_000.0, 50.0),
            sample(Some(1), None, 60_000_000.0, 50.0),
        ];
        assert!(aggregate(&rows, Utc::now()).is_empty());
    }

    #[test]
    fn test_zoneless_listings_group_by_city() {
        let rows = vec![
            sample(None, Some("Brno"), 4_000_000.0, 50.0),
            sample(None, Some("Brno"), 4_500_000.0, 50.0),
            sample(None, Some("Brno"), 5_000_000.0, 50.0),
            sample(None, None, 5_000_000.0, 50.0),
        ];
        let out = aggregate(&rows, Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scope, BenchmarkScope::City);
        assert_eq!(out[0].scope_key, "Brno");
        assert_eq!(out[0].median_price_m2, 90_000.0);
    }
}
