//! Ingestion run bookkeeping.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::{IngestionRunRecord, NewIngestionRun};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{IngestionRun, RunCounts, RunStatus};
use crate::schema::ingestion_runs;
use crate::with_conn;

impl From<IngestionRunRecord> for IngestionRun {
    fn from(record: IngestionRunRecord) -> Self {
        IngestionRun {
            id: record.id,
            source: record.source,
            started_at: parse_datetime(&record.started_at),
            finished_at: parse_datetime_opt(record.finished_at),
            status: RunStatus::from_str(&record.status).unwrap_or(RunStatus::Failed),
            counts: RunCounts {
                found: record.listings_found,
                new: record.listings_new,
                updated: record.listings_updated,
            },
            error: record.error,
        }
    }
}

#[derive(Clone)]
pub struct IngestionRunRepository {
    pool: DbPool,
}

impl IngestionRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a run in `running` state and return its id.
    pub async fn start(&self, source: &str, at: DateTime<Utc>) -> Result<i32, DbError> {
        let started_at = format_datetime(at);
        with_conn!(self.pool, conn => {
            diesel::insert_into(ingestion_runs::table)
                .values(&NewIngestionRun {
                    source,
                    started_at: &started_at,
                    status: RunStatus::Running.as_str(),
                    listings_found: 0,
                    listings_new: 0,
                    listings_updated: 0,
                })
                .execute(&mut conn)
                .await?;

            ingestion_runs::table
                .filter(ingestion_runs::source.eq(source))
                .order(ingestion_runs::id.desc())
                .select(ingestion_runs::id)
                .first(&mut conn)
                .await
        })
    }

    /// Finalize a run. Runs already finalized are left unchanged.
    pub async fn finish(
        &self,
        id: i32,
        status: RunStatus,
        counts: RunCounts,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let finished_at = format_datetime(at);
        with_conn!(self.pool, conn => {
            let rows = diesel::update(
                ingestion_runs::table
                    .find(id)
                    .filter(ingestion_runs::status.eq(RunStatus::Running.as_str())),
            )
            .set((
                ingestion_runs::finished_at.eq(Some(&finished_at)),
                ingestion_runs::status.eq(status.as_str()),
                ingestion_runs::listings_found.eq(counts.found),
                ingestion_runs::listings_new.eq(counts.new),
                ingestion_runs::listings_updated.eq(counts.updated),
                ingestion_runs::error.eq(error),
            ))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    pub async fn get(&self, id: i32) -> Result<Option<IngestionRun>, DbError> {
        with_conn!(self.pool, conn => {
            ingestion_runs::table
                .find(id)
                .first::<IngestionRunRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(IngestionRun::from))
        })
    }

    /// Most recent runs, optionally for one source.
    pub async fn recent(
        &self,
        source: Option<&str>,
        limit: i64,
    ) -> Result<Vec<IngestionRun>, DbError> {
        with_conn!(self.pool, conn => {
            let mut query = ingestion_runs::table
                .order(ingestion_runs::id.desc())
                .limit(limit)
                .into_boxed();
            if let Some(source) = source {
                query = query.filter(ingestion_runs::source.eq(source));
            }
            query
                .load::<IngestionRunRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(IngestionRun::from).collect())
        })
    }
}
