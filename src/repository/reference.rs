//! Third-party reference prices.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, DbPool};
use super::records::{NewReferenceBenchmark, ReferenceBenchmarkRecord};
use super::util::fold_diacritics;
use super::{format_datetime, parse_datetime};
use crate::models::{PropertyKind, ReferenceBenchmark, ReferencePoint, TransactionKind};
use crate::schema::reference_benchmarks;
use crate::with_conn;

impl From<ReferenceBenchmarkRecord> for ReferenceBenchmark {
    fn from(record: ReferenceBenchmarkRecord) -> Self {
        ReferenceBenchmark {
            source: record.source,
            region: record.region,
            property_kind: PropertyKind::from_str(&record.property_kind)
                .unwrap_or(PropertyKind::Apartment),
            transaction_kind: TransactionKind::from_str(&record.transaction_kind)
                .unwrap_or(TransactionKind::Sale),
            price_m2: record.price_m2,
            period: record.period,
            fetched_at: parse_datetime(&record.fetched_at),
        }
    }
}

fn slug(s: &str) -> String {
    fold_diacritics(s.trim()).split_whitespace().collect::<Vec<_>>().join("-")
}

#[derive(Clone)]
pub struct ReferenceRepository {
    pool: DbPool,
}

impl ReferenceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert points from one feed keyed by (source, region, kind, transaction, period).
    pub async fn upsert_points(
        &self,
        source: &str,
        points: &[ReferencePoint],
        fetched_at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if points.is_empty() {
            return Ok(0);
        }
        let source = source.to_string();
        let points = points.to_vec();
        let fetched_at = format_datetime(fetched_at);

        with_conn!(self.pool, conn => {
            conn.transaction::<_, DbError, _>(|conn| {
                Box::pin(async move {
                    let mut written = 0;
                    for point in &points {
                        written += diesel::insert_into(reference_benchmarks::table)
                            .values(&NewReferenceBenchmark {
                                source: &source,
                                region: &point.region,
                                property_kind: point.property_kind.as_str(),
                                transaction_kind: point.transaction_kind.as_str(),
                                price_m2: point.price_per_m2,
                                period: &point.period,
                                fetched_at: &fetched_at,
                            })
                            .on_conflict((
                                reference_benchmarks::source,
                                reference_benchmarks::region,
                                reference_benchmarks::property_kind,
                                reference_benchmarks::transaction_kind,
                                reference_benchmarks::period,
                            ))
                            .do_update()
                            .set((
                                reference_benchmarks::price_m2
                                    .eq(excluded(reference_benchmarks::price_m2)),
                                reference_benchmarks::fetched_at
                                    .eq(excluded(reference_benchmarks::fetched_at)),
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

    /// Latest point of `source` whose region contains `fragment`.
    ///
    /// Both sides are compared without diacritics and with spaces as
    /// hyphens, so "nove-mesto" matches "Nové Město".
    pub async fn latest_matching(
        &self,
        source: &str,
        fragment: &str,
        transaction_kind: TransactionKind,
    ) -> Result<Option<ReferenceBenchmark>, DbError> {
        let needle = slug(fragment);
        if needle.is_empty() {
            return Ok(None);
        }
        let records: Vec<ReferenceBenchmarkRecord> = with_conn!(self.pool, conn => {
            reference_benchmarks::table
                .filter(reference_benchmarks::source.eq(source))
                .filter(reference_benchmarks::transaction_kind.eq(transaction_kind.as_str()))
                .order(reference_benchmarks::fetched_at.desc())
                .load(&mut conn)
                .await
        })?;
        Ok(records
            .into_iter()
            .find(|r| slug(&r.region).contains(&needle))
            .map(ReferenceBenchmark::from))
    }

    /// Latest point of `source` for exactly this region.
    pub async fn latest_exact(
        &self,
        source: &str,
        region: &str,
        transaction_kind: TransactionKind,
    ) -> Result<Option<ReferenceBenchmark>, DbError> {
        with_conn!(self.pool, conn => {
            reference_benchmarks::table
                .filter(reference_benchmarks::source.eq(source))
                .filter(reference_benchmarks::region.eq(region))
                .filter(reference_benchmarks::transaction_kind.eq(transaction_kind.as_str()))
                .order(reference_benchmarks::fetched_at.desc())
                .first::<ReferenceBenchmarkRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(ReferenceBenchmark::from))
        })
    }

    pub async fn list(&self, source: Option<&str>) -> Result<Vec<ReferenceBenchmark>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = reference_benchmarks::table
                .order((reference_benchmarks::source.asc(), reference_benchmarks::region.asc()))
                .into_boxed();
            if let Some(source) = source {
                query = query.filter(reference_benchmarks::source.eq(source));
            }
            query
                .load::<ReferenceBenchmarkRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ReferenceBenchmark::from).collect())
        })
    }
}
