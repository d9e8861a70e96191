//! Database context for managing the connection pool and repository access.

use std::path::Path;

use diesel::sql_types::Text;
use diesel::QueryableByName;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use super::benchmark::BenchmarkRepository;
use super::event_queue::EventQueueRepository;
use super::listing::ListingRepository;
use super::pool::{DbError, DbPool};
use super::reference::ReferenceRepository;
use super::run::IngestionRunRepository;
use super::subscription::SubscriptionRepository;
use super::zone::ZoneRepository;
use crate::with_conn;

/// Database context that owns the pool and hands out repositories.
///
/// Create one per command or service, then use it to access all repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url(&settings.database_url());
/// ctx.init_schema().await?;
/// let active = ctx.listings().count_active().await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Create a context from a database URL (`sqlite:path` or a plain path).
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::from_url(database_url),
        }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn listings(&self) -> ListingRepository {
        ListingRepository::new(self.pool.clone())
    }

    pub fn runs(&self) -> IngestionRunRepository {
        IngestionRunRepository::new(self.pool.clone())
    }

    pub fn zones(&self) -> ZoneRepository {
        ZoneRepository::new(self.pool.clone())
    }

    pub fn benchmarks(&self) -> BenchmarkRepository {
        BenchmarkRepository::new(self.pool.clone())
    }

    pub fn references(&self) -> ReferenceRepository {
        ReferenceRepository::new(self.pool.clone())
    }

    pub fn subscriptions(&self) -> SubscriptionRepository {
        SubscriptionRepository::new(self.pool.clone())
    }

    pub fn event_queue(&self) -> EventQueueRepository {
        EventQueueRepository::new(self.pool.clone())
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            conn.batch_execute(SCHEMA_SQL).await
        })
    }

    /// List user tables, for diagnostics.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        #[derive(QueryableByName)]
        struct TableName {
            #[diesel(sql_type = Text)]
            name: String,
        }

        with_conn!(self.pool, conn => {
            let rows: Vec<TableName> = diesel::sql_query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .load(&mut conn)
            .await?;
            Ok(rows.into_iter().map(|r| r.name).collect())
        })
    }
}

const SCHEMA_SQL: &str = r#"
    PRAGMA journal_mode = WAL;

    -- Canonical listings, one row per (source, external_id)
    CREATE TABLE IF NOT EXISTS listings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        external_id TEXT NOT NULL,
        url TEXT,
        title TEXT,
        description TEXT,
        property_kind TEXT NOT NULL,
        transaction_kind TEXT NOT NULL,
        layout TEXT,
        price REAL,
        currency TEXT NOT NULL DEFAULT 'CZK',
        area_m2 REAL,
        rooms INTEGER,
        latitude REAL,
        longitude REAL,
        zone_code INTEGER,
        zone_name TEXT,
        city TEXT,
        district TEXT,
        address TEXT,
        images TEXT NOT NULL DEFAULT '[]',
        raw_payload TEXT NOT NULL DEFAULT 'null',
        status TEXT NOT NULL DEFAULT 'active',
        duplicate_of INTEGER REFERENCES listings(id) ON DELETE SET NULL,
        missed_runs INTEGER NOT NULL DEFAULT 0,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(source, external_id)
    );
    CREATE INDEX IF NOT EXISTS idx_listings_source_status ON listings(source, status);
    CREATE INDEX IF NOT EXISTS idx_listings_zone ON listings(zone_code);
    CREATE INDEX IF NOT EXISTS idx_listings_city ON listings(city);

    CREATE TABLE IF NOT EXISTS price_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
        price REAL NOT NULL,
        price_per_m2 REAL,
        recorded_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_price_snapshots_listing ON price_snapshots(listing_id);

    CREATE TABLE IF NOT EXISTS ingestion_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        status TEXT NOT NULL,
        listings_found INTEGER NOT NULL DEFAULT 0,
        listings_new INTEGER NOT NULL DEFAULT 0,
        listings_updated INTEGER NOT NULL DEFAULT 0,
        error TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_ingestion_runs_source ON ingestion_runs(source, started_at);

    CREATE TABLE IF NOT EXISTS zones (
        code INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        geometry TEXT NOT NULL,
        min_lon REAL NOT NULL,
        min_lat REAL NOT NULL,
        max_lon REAL NOT NULL,
        max_lat REAL NOT NULL
    );

    -- Own aggregates; scope is 'zone' (scope_key = zone code) or 'city'
    CREATE TABLE IF NOT EXISTS zone_benchmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope TEXT NOT NULL,
        scope_key TEXT NOT NULL,
        label TEXT NOT NULL,
        property_kind TEXT NOT NULL,
        transaction_kind TEXT NOT NULL,
        median_price_m2 REAL NOT NULL,
        avg_price_m2 REAL NOT NULL,
        sample_count INTEGER NOT NULL,
        computed_at TEXT NOT NULL,
        UNIQUE(scope, scope_key, property_kind, transaction_kind)
    );

    CREATE TABLE IF NOT EXISTS reference_benchmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        region TEXT NOT NULL,
        property_kind TEXT NOT NULL,
        transaction_kind TEXT NOT NULL,
        price_m2 REAL NOT NULL,
        period TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        UNIQUE(source, region, property_kind, transaction_kind, period)
    );

    CREATE TABLE IF NOT EXISTS subscription_filters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT,
        property_kind TEXT,
        transaction_kind TEXT,
        city TEXT,
        layouts TEXT,
        price_min REAL,
        price_max REAL,
        area_min REAL,
        area_max REAL,
        notify_new INTEGER NOT NULL DEFAULT 1,
        notify_price_drop INTEGER NOT NULL DEFAULT 1,
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS delivery_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filter_id INTEGER NOT NULL REFERENCES subscription_filters(id) ON DELETE CASCADE,
        listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        delivered_at TEXT NOT NULL,
        UNIQUE(filter_id, listing_id, kind)
    );

    -- Durable FIFO of domain events, drained by the notification worker
    CREATE TABLE IF NOT EXISTS event_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        payload TEXT NOT NULL,
        enqueued_at TEXT NOT NULL
    );
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        let tables = ctx.list_tables().await.unwrap();
        for expected in [
            "delivery_records",
            "event_queue",
            "ingestion_runs",
            "listings",
            "price_snapshots",
            "reference_benchmarks",
            "subscription_filters",
            "zone_benchmarks",
            "zones",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }
}
