//! Single-consumer loop that turns queued events into notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::format::render;
use super::matcher::matches;
use super::notifier::Notifier;
use crate::events::{EventBus, EventBusError};
use crate::models::DomainEvent;
use crate::repository::{DbContext, DbError};

/// Sleep when the queue is empty.
pub const IDLE_POLL: Duration = Duration::from_secs(5);
/// Sleep after a failed pop or a failed pass.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// What happened to one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: usize,
    pub delivered: usize,
    /// Matched filters that were already notified.
    pub already_delivered: usize,
    pub failed: usize,
    /// Sent, but the delivery record could not be stored.
    pub unrecorded: usize,
}

pub struct NotificationWorker {
    ctx: DbContext,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
}

impl NotificationWorker {
    pub fn new(ctx: DbContext, bus: EventBus, notifier: Arc<dyn Notifier>) -> Self {
        Self { ctx, bus, notifier }
    }

    /// Evaluate every active filter against the event's listing and deliver
    /// to each match not yet notified. A failed delivery leaves no record.
    /// A record that cannot be stored is logged and the remaining filters
    /// are still served.
    pub async fn process_event(&self, event: &DomainEvent) -> Result<DispatchReport, DbError> {
        let mut report = DispatchReport::default();

        let Some(listing) = self.ctx.listings().get(event.listing_id).await? else {
            debug!("Listing {} no longer exists, dropping event", event.listing_id);
            return Ok(report);
        };

        let subscriptions = self.ctx.subscriptions();
        let filters = subscriptions.list_active().await?;
        let mut message: Option<String> = None;

        for filter in filters.iter().filter(|f| matches(f, &listing, event.kind)) {
            report.matched += 1;
            if subscriptions
                .was_delivered(filter.id, listing.id, event.kind)
                .await?
            {
                report.already_delivered += 1;
                continue;
            }

            let text = message.get_or_insert_with(|| render(&listing, event));
            match self.notifier.deliver(&filter.owner, text).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!(
                        "Sent {} for listing {} to {}",
                        event.kind.as_str(),
                        listing.id,
                        filter.owner
                    );
                    if let Err(e) = subscriptions
                        .record_delivery(filter.id, listing.id, event.kind, Utc::now())
                        .await
                    {
                        report.unrecorded += 1;
                        error!(
                            "Could not record {} for listing {} to filter {}: {}",
                            event.kind.as_str(),
                            listing.id,
                            filter.id,
                            e
                        );
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Delivery of {} for listing {} to {} failed: {}",
                        event.kind.as_str(),
                        listing.id,
                        filter.owner,
                        e
                    );
                }
            }
        }
        Ok(report)
    }

    /// Drain the queue once. Returns the number of events processed.
    pub async fn run_once(&self) -> Result<usize, EventBusError> {
        let mut processed = 0;
        while let Some(event) = self.bus.next_event().await? {
            self.process_event(&event).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Consume events forever.
    pub async fn run(&self) {
        info!("Notification worker started");
        loop {
            match self.bus.next_event().await {
                Ok(Some(event)) => {
                    if let Err(e) = self.process_event(&event).await {
                        error!("Notification pass for listing {} failed: {}", event.listing_id, e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
                Ok(None) => tokio::time::sleep(IDLE_POLL).await,
                Err(e) => {
                    error!("Event queue error: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BroadcastTopic, EventSink};
    use crate::models::{FilterSpec, NormalizedListing, PropertyKind, TransactionKind};
    use crate::notify::notifier::DeliveryError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, target: &str, message: &str) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected {
                    status: 403,
                    body: "bot was blocked by the user".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), message.to_string()));
            Ok(())
        }
    }

    /// Deletes one filter while delivering to its owner, so the delivery
    /// record for it can no longer be stored.
    struct DeletesFilter {
        ctx: DbContext,
        owner: String,
        filter_id: i32,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for DeletesFilter {
        async fn deliver(&self, target: &str, _message: &str) -> Result<(), DeliveryError> {
            if target == self.owner {
                self.ctx.subscriptions().delete(self.filter_id).await.unwrap();
            }
            self.sent.lock().unwrap().push(target.to_string());
            Ok(())
        }
    }

    async fn setup() -> (DbContext, EventBus, i32, TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let bus = EventBus::database(&ctx, BroadcastTopic::new());

        let mut record = NormalizedListing::new("1", PropertyKind::Apartment, TransactionKind::Sale);
        record.price = Some(4_500_000.0);
        record.city = Some("Praha".to_string());
        let outcome = ctx
            .listings()
            .upsert("sreality", &record, Utc::now())
            .await
            .unwrap();
        (ctx, bus, outcome.listing_id, dir)
    }

    #[tokio::test]
    async fn test_delivers_once_per_filter() {
        let (ctx, bus, listing_id, _dir) = setup().await;
        let mut spec = FilterSpec::for_owner("42");
        spec.price_max = Some(6_000_000.0);
        let filter_id = ctx.subscriptions().create(&spec).await.unwrap();
        let mut other = FilterSpec::for_owner("43");
        other.city = Some("Brno".to_string());
        ctx.subscriptions().create(&other).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let worker = NotificationWorker::new(ctx.clone(), bus.clone(), recorder.clone());

        let event = DomainEvent::price_drop(listing_id, "sreality", 5_000_000.0);
        let first = worker.process_event(&event).await.unwrap();
        assert_eq!(first.matched, 1);
        assert_eq!(first.delivered, 1);

        let replay = worker.process_event(&event).await.unwrap();
        assert_eq!(replay.delivered, 0);
        assert_eq!(replay.already_delivered, 1);

        assert_eq!(ctx.subscriptions().delivery_count(filter_id).await.unwrap(), 1);
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "42");
        assert!(sent[0].1.contains("Pokles ceny o 10.0%"));
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_no_record() {
        let (ctx, bus, listing_id, _dir) = setup().await;
        let filter_id = ctx
            .subscriptions()
            .create(&FilterSpec::for_owner("42"))
            .await
            .unwrap();

        let failing = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let worker = NotificationWorker::new(ctx.clone(), bus, failing);
        let report = worker
            .process_event(&DomainEvent::new_listing(listing_id, "sreality"))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(ctx.subscriptions().delivery_count(filter_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_delivery_does_not_stop_other_filters() {
        let (ctx, bus, listing_id, _dir) = setup().await;
        let doomed = ctx
            .subscriptions()
            .create(&FilterSpec::for_owner("42"))
            .await
            .unwrap();
        let kept = ctx
            .subscriptions()
            .create(&FilterSpec::for_owner("43"))
            .await
            .unwrap();

        let notifier = Arc::new(DeletesFilter {
            ctx: ctx.clone(),
            owner: "42".to_string(),
            filter_id: doomed,
            sent: Mutex::new(Vec::new()),
        });
        let worker = NotificationWorker::new(ctx.clone(), bus, notifier.clone());
        let report = worker
            .process_event(&DomainEvent::new_listing(listing_id, "sreality"))
            .await
            .unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.unrecorded, 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
        assert_eq!(ctx.subscriptions().delivery_count(kept).await.unwrap(), 1);
        assert_eq!(ctx.subscriptions().delivery_count(doomed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_once_drains_queue() {
        let (ctx, bus, listing_id, _dir) = setup().await;
        ctx.subscriptions()
            .create(&FilterSpec::for_owner("42"))
            .await
            .unwrap();
        bus.publish(&DomainEvent::new_listing(listing_id, "sreality"))
            .await;
        bus.publish(&DomainEvent::new_listing(9_999, "sreality")).await;

        let recorder = Arc::new(Recorder::default());
        let worker = NotificationWorker::new(ctx, bus.clone(), recorder.clone());
        assert_eq!(worker.run_once().await.unwrap(), 2);
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        assert_eq!(worker.run_once().await.unwrap(), 0);
    }
}
