//! Own price benchmarks, zone and city scoped.

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{NewZoneBenchmark, ZoneBenchmarkRecord};
use super::{format_datetime, parse_datetime};
use crate::models::{BenchmarkScope, PropertyKind, TransactionKind, ZoneBenchmark};
use crate::schema::zone_benchmarks;
use crate::with_conn;

impl From<ZoneBenchmarkRecord> for ZoneBenchmark {
    fn from(record: ZoneBenchmarkRecord) -> Self {
        ZoneBenchmark {
            scope: BenchmarkScope::from_str(&record.scope).unwrap_or(BenchmarkScope::Zone),
            scope_key: record.scope_key,
            label: record.label,
            property_kind: PropertyKind::from_str(&record.property_kind)
                .unwrap_or(PropertyKind::Apartment),
            transaction_kind: TransactionKind::from_str(&record.transaction_kind)
                .unwrap_or(TransactionKind::Sale),
            median_price_m2: record.median_price_m2,
            avg_price_m2: record.avg_price_m2,
            sample_count: record.sample_count,
            computed_at: parse_datetime(&record.computed_at),
        }
    }
}

#[derive(Clone)]
pub struct BenchmarkRepository {
    pool: DbPool,
}

impl BenchmarkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert computed aggregates keyed by (scope, scope_key, kind, transaction).
    pub async fn upsert_many(&self, items: &[ZoneBenchmark]) -> Result<usize, DbError> {
        if items.is_empty() {
            return Ok(0);
        }
        let items = items.to_vec();

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let mut written = 0;
                    for item in &items {
                        let computed_at = format_datetime(item.computed_at);
                        written += diesel::insert_into(zone_benchmarks::table)
                            .values(&NewZoneBenchmark {
                                scope: item.scope.as_str(),
                                scope_key: &item.scope_key,
                                label: &item.label,
                                property_kind: item.property_kind.as_str(),
                                transaction_kind: item.transaction_kind.as_str(),
                                median_price_m2: item.median_price_m2,
                                avg_price_m2: item.avg_price_m2,
                                sample_count: item.sample_count,
                                computed_at: &computed_at,
                            })
                            .on_conflict((
                                zone_benchmarks::scope,
                                zone_benchmarks::scope_key,
                                zone_benchmarks::property_kind,
                                zone_benchmarks::transaction_kind,
                            ))
                            .do_update()
                            .set((
                                zone_benchmarks::label.eq(excluded(zone_benchmarks::label)),
                                zone_benchmarks::median_price_m2
                                    .eq(excluded(zone_benchmarks::median_price_m2)),
                                zone_benchmarks::avg_price_m2
                                    .eq(excluded(zone_benchmarks::avg_price_m2)),
                                zone_benchmarks::sample_count
                                    .eq(excluded(zone_benchmarks::sample_count)),
                                zone_benchmarks::computed_at
                                    .eq(excluded(zone_benchmarks::computed_at)),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    Ok(written)
                })
            })
            .await
        })
    }

    /// All benchmarks of a scope (or every scope), largest samples first.
    pub async fn list(&self, scope: Option<BenchmarkScope>) -> Result<Vec<ZoneBenchmark>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = zone_benchmarks::table
                .order((
                    zone_benchmarks::sample_count.desc(),
                    zone_benchmarks::label.asc(),
                ))
                .into_boxed();
            if let Some(scope) = scope {
                query = query.filter(zone_benchmarks::scope.eq(scope.as_str()));
            }
            query
                .load::<ZoneBenchmarkRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ZoneBenchmark::from).collect())
        })
    }

    /// Zone benchmarks with at least `min_samples`, for the given transaction
    /// and, when set, property kind. Largest samples first.
    pub async fn zone_candidates(
        &self,
        transaction_kind: TransactionKind,
        property_kind: Option<PropertyKind>,
        min_samples: i32,
    ) -> Result<Vec<ZoneBenchmark>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = zone_benchmarks::table
                .filter(zone_benchmarks::scope.eq(BenchmarkScope::Zone.as_str()))
                .filter(zone_benchmarks::transaction_kind.eq(transaction_kind.as_str()))
                .filter(zone_benchmarks::sample_count.ge(min_samples))
                .order(zone_benchmarks::sample_count.desc())
                .into_boxed();
            if let Some(kind) = property_kind {
                query = query.filter(zone_benchmarks::property_kind.eq(kind.as_str()));
            }
            query
                .load::<ZoneBenchmarkRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ZoneBenchmark::from).collect())
        })
    }
}
