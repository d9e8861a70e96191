//! Ingestion upsert engine.
//!
//! One cycle per source: fetch every raw payload, normalize and upsert each
//! in fetch order, then age the listings that were not observed. Failures
//! of a single listing are logged and skipped; only a fetch failure or a
//! failed staleness sweep fails the run.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::EventSink;
use crate::models::{DomainEvent, NormalizedListing, RunCounts, RunStatus};
use crate::repository::{DbContext, DbError, UpsertOutcome, UpsertStatus};
use crate::scrapers::{FetchError, SourceAdapter, ValidationGap};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error(transparent)]
    Validation(#[from] ValidationGap),
}

/// Summary of one finished cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub run_id: i32,
    pub counts: RunCounts,
    /// Payloads dropped by normalize.
    pub skipped: usize,
    /// Listings whose upsert failed.
    pub failed: usize,
    /// Listings whose missed-run counter was incremented.
    pub missed: usize,
    /// Listings moved to `removed` this cycle.
    pub removed: usize,
}

#[derive(Clone)]
pub struct IngestionEngine {
    ctx: DbContext,
    sink: Arc<dyn EventSink>,
}

impl IngestionEngine {
    pub fn new(ctx: DbContext, sink: Arc<dyn EventSink>) -> Self {
        Self { ctx, sink }
    }

    /// Upsert one listing, then record history and publish events.
    ///
    /// A snapshot and event follow a new listing or a price decrease. The
    /// snapshot and the event are best-effort once the upsert committed.
    pub async fn upsert(
        &self,
        source: &str,
        record: &NormalizedListing,
    ) -> Result<UpsertOutcome, IngestError> {
        let now = Utc::now();
        let outcome = self.ctx.listings().upsert(source, record, now).await?;

        let event = match outcome.status {
            UpsertStatus::New => Some(DomainEvent::new_listing(outcome.listing_id, source)),
            UpsertStatus::PriceChanged if outcome.is_price_drop(record.price) => outcome
                .previous_price
                .map(|old| DomainEvent::price_drop(outcome.listing_id, source, old)),
            _ => None,
        };

        if let Some(event) = event {
            if let Some(price) = record.price {
                if let Err(e) = self
                    .ctx
                    .listings()
                    .append_snapshot(outcome.listing_id, price, record.area_m2, now)
                    .await
                {
                    warn!(
                        "[{}] Failed to record price for listing {}: {}",
                        source, outcome.listing_id, e
                    );
                }
            }
            self.sink.publish(&event).await;
        }

        Ok(outcome)
    }

    /// Age listings of `source` not observed this cycle.
    ///
    /// Does nothing when nothing was observed.
    pub async fn mark_missing(
        &self,
        source: &str,
        seen_external_ids: &[String],
    ) -> Result<(usize, usize), IngestError> {
        if seen_external_ids.is_empty() {
            warn!("[{}] No listings observed, skipping staleness sweep", source);
            return Ok((0, 0));
        }
        let (missed, removed) = self
            .ctx
            .listings()
            .mark_missing(source, seen_external_ids, Utc::now())
            .await?;
        if removed > 0 {
            info!("[{}] Marked {} listings as removed", source, removed);
        }
        Ok((missed, removed))
    }

    /// Run one full ingestion cycle for an adapter.
    pub async fn run_cycle(&self, adapter: &dyn SourceAdapter) -> Result<CycleReport, IngestError> {
        let source = adapter.id().to_string();
        let runs = self.ctx.runs();
        let run_id = runs.start(&source, Utc::now()).await?;
        let mut report = CycleReport {
            run_id,
            ..Default::default()
        };

        let raw_items = match adapter.fetch_all().await {
            Ok(items) => items,
            Err(e) => {
                error!("[{}] Fetch failed, run {} aborted: {}", source, run_id, e);
                let message = e.to_string();
                runs.finish(run_id, RunStatus::Failed, report.counts, Some(&message), Utc::now())
                    .await?;
                return Err(e.into());
            }
        };
        report.counts.found = i32::try_from(raw_items.len()).unwrap_or(i32::MAX);

        let mut seen = Vec::with_capacity(raw_items.len());
        for raw in &raw_items {
            let record = match adapter.normalize(raw) {
                Ok(record) => record,
                Err(gap) => {
                    debug!("[{}] {}", source, gap);
                    report.skipped += 1;
                    continue;
                }
            };
            seen.push(record.external_id.clone());

            match self.upsert(&source, &record).await {
                Ok(outcome) => match outcome.status {
                    UpsertStatus::New => report.counts.new += 1,
                    UpsertStatus::PriceChanged | UpsertStatus::Updated => {
                        report.counts.updated += 1
                    }
                },
                Err(e) => {
                    error!(
                        "[{}] Failed to upsert listing {}: {}",
                        source, record.external_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        match self.mark_missing(&source, &seen).await {
            Ok((missed, removed)) => {
                report.missed = missed;
                report.removed = removed;
            }
            Err(e) => {
                error!("[{}] Staleness sweep failed: {}", source, e);
                let message = e.to_string();
                runs.finish(run_id, RunStatus::Failed, report.counts, Some(&message), Utc::now())
                    .await?;
                return Err(e);
            }
        }

        runs.finish(run_id, RunStatus::Completed, report.counts, None, Utc::now())
            .await?;
        info!(
            "[{}] Cycle complete: {} found, {} new, {} updated, {} skipped",
            source, report.counts.found, report.counts.new, report.counts.updated, report.skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastTopic, EventBus};
    use crate::models::{EventKind, ListingStatus, PropertyKind, TransactionKind};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Serves a scripted sequence of cycles; each entry is one fetch result.
    struct ScriptedAdapter {
        cycles: Mutex<Vec<Result<Vec<Value>, String>>>,
    }

    impl ScriptedAdapter {
        fn new(cycles: Vec<Result<Vec<Value>, String>>) -> Self {
            Self {
                cycles: Mutex::new(cycles.into_iter().rev().collect()),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn id(&self) -> &str {
            "test"
        }

        async fn fetch_all(&self) -> Result<Vec<Value>, FetchError> {
            let next = self.cycles.lock().unwrap().pop().unwrap_or(Ok(Vec::new()));
            next.map_err(FetchError::Decode)
        }

        fn normalize(&self, raw: &Value) -> Result<NormalizedListing, ValidationGap> {
            let id = raw["id"]
                .as_str()
                .ok_or_else(|| ValidationGap("no id".into()))?;
            let mut listing =
                NormalizedListing::new(id, PropertyKind::Apartment, TransactionKind::Sale);
            listing.price = raw["price"].as_f64();
            listing.area_m2 = Some(50.0);
            Ok(listing)
        }
    }

    async fn setup() -> (IngestionEngine, EventBus, DbContext, TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let bus = EventBus::database(&ctx, BroadcastTopic::new());
        let engine = IngestionEngine::new(ctx.clone(), Arc::new(bus.clone()));
        (engine, bus, ctx, dir)
    }

    fn item(id: &str, price: f64) -> Value {
        json!({"id": id, "price": price})
    }

    #[tokio::test]
    async fn test_unchanged_price_is_updated_without_snapshot() {
        let (engine, bus, ctx, _dir) = setup().await;
        let mut record =
            NormalizedListing::new("1", PropertyKind::Apartment, TransactionKind::Sale);
        record.price = Some(100.0);

        let first = engine.upsert("test", &record).await.unwrap();
        let second = engine.upsert("test", &record).await.unwrap();
        assert_eq!(first.status, UpsertStatus::New);
        assert_eq!(second.status, UpsertStatus::Updated);

        assert_eq!(ctx.listings().snapshots(first.listing_id).await.unwrap().len(), 1);
        assert_eq!(bus.next_event().await.unwrap().unwrap().kind, EventKind::NewListing);
        assert!(bus.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_price_increase_emits_nothing() {
        let (engine, bus, ctx, _dir) = setup().await;
        let mut record =
            NormalizedListing::new("1", PropertyKind::Apartment, TransactionKind::Sale);
        record.price = Some(100.0);
        let first = engine.upsert("test", &record).await.unwrap();
        bus.next_event().await.unwrap();

        record.price = Some(120.0);
        let second = engine.upsert("test", &record).await.unwrap();
        assert_eq!(second.status, UpsertStatus::PriceChanged);
        assert!(bus.next_event().await.unwrap().is_none());
        assert_eq!(ctx.listings().snapshots(first.listing_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_price_drop_carries_previous_price() {
        let (engine, bus, ctx, _dir) = setup().await;
        let mut record =
            NormalizedListing::new("1", PropertyKind::Apartment, TransactionKind::Sale);
        record.price = Some(5_000_000.0);
        let first = engine.upsert("test", &record).await.unwrap();
        bus.next_event().await.unwrap();

        record.price = Some(4_500_000.0);
        engine.upsert("test", &record).await.unwrap();
        let event = bus.next_event().await.unwrap().unwrap();
        assert_eq!(event.kind, EventKind::PriceDrop);
        assert_eq!(event.old_price, Some(5_000_000.0));
        assert_eq!(ctx.listings().snapshots(first.listing_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_removed_exactly_on_third_missed_cycle() {
        let (engine, _bus, ctx, _dir) = setup().await;
        let adapter = ScriptedAdapter::new(vec![
            Ok(vec![item("a", 1.0), item("b", 1.0)]),
            Ok(vec![item("a", 1.0)]),
            Ok(vec![item("a", 1.0)]),
            Ok(vec![item("a", 1.0)]),
            Ok(vec![item("a", 1.0), item("b", 1.0)]),
        ]);

        engine.run_cycle(&adapter).await.unwrap();
        for expected_missed in 1..=2 {
            let report = engine.run_cycle(&adapter).await.unwrap();
            assert_eq!(report.removed, 0);
            let b = ctx.listings().find_by_external_id("test", "b").await.unwrap().unwrap();
            assert_eq!(b.missed_runs, expected_missed);
            assert_eq!(b.status, ListingStatus::Active);
        }

        let report = engine.run_cycle(&adapter).await.unwrap();
        assert_eq!(report.removed, 1);
        let b = ctx.listings().find_by_external_id("test", "b").await.unwrap().unwrap();
        assert_eq!(b.status, ListingStatus::Removed);
        assert_eq!(b.missed_runs, 3);

        // Seen again: back to active with a clean miss count.
        let report = engine.run_cycle(&adapter).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(report.counts.new, 0);
        let b = ctx.listings().find_by_external_id("test", "b").await.unwrap().unwrap();
        assert_eq!(b.status, ListingStatus::Active);
        assert_eq!(b.missed_runs, 0);
    }

    #[tokio::test]
    async fn test_empty_cycle_does_not_age_source() {
        let (engine, _bus, ctx, _dir) = setup().await;
        let adapter = ScriptedAdapter::new(vec![Ok(vec![item("a", 1.0)]), Ok(vec![])]);
        engine.run_cycle(&adapter).await.unwrap();
        let report = engine.run_cycle(&adapter).await.unwrap();
        assert_eq!(report.missed, 0);
        let a = ctx.listings().find_by_external_id("test", "a").await.unwrap().unwrap();
        assert_eq!(a.missed_runs, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_finalizes_failed_run() {
        let (engine, _bus, ctx, _dir) = setup().await;
        let adapter = ScriptedAdapter::new(vec![Err("portal down".into())]);
        assert!(matches!(
            engine.run_cycle(&adapter).await,
            Err(IngestError::Fetch(_))
        ));
        let runs = ctx.runs().recent(Some("test"), 1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error.as_deref().unwrap().contains("portal down"));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_skipped() {
        let (engine, _bus, ctx, _dir) = setup().await;
        let adapter =
            ScriptedAdapter::new(vec![Ok(vec![json!({"bogus": true}), item("a", 1.0)])]);
        let report = engine.run_cycle(&adapter).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.counts.found, 2);
        assert_eq!(report.counts.new, 1);

        let run = ctx.runs().get(report.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counts.new, 1);
    }
}
