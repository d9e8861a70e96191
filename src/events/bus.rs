//! The event bus: one publish, two independent sinks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::{
    BroadcastTopic, DbEventQueue, EventBusError, EventQueue, EventSink, EventTopic,
};
use crate::models::DomainEvent;
use crate::repository::DbContext;

#[derive(Clone)]
pub struct EventBus {
    queue: Arc<dyn EventQueue>,
    topic: Arc<dyn EventTopic>,
}

impl EventBus {
    pub fn new(queue: Arc<dyn EventQueue>, topic: Arc<dyn EventTopic>) -> Self {
        Self { queue, topic }
    }

    /// Queue in the SQLite store, topic in-process.
    pub fn database(ctx: &DbContext, topic: BroadcastTopic) -> Self {
        Self::new(
            Arc::new(DbEventQueue::new(ctx.event_queue())),
            Arc::new(topic),
        )
    }

    /// Build the bus named by the `event_backend` setting.
    ///
    /// `database` uses the SQLite queue; a `redis://` URL uses Redis for both
    /// queue and topic when the `redis-backend` feature is enabled.
    pub async fn from_backend(
        backend: &str,
        ctx: &DbContext,
        topic: BroadcastTopic,
    ) -> Result<Self, EventBusError> {
        if backend == "database" {
            return Ok(Self::database(ctx, topic));
        }

        match Self::redis(backend).await? {
            Some(bus) => Ok(bus),
            None => Err(EventBusError::UnsupportedBackend(backend.to_string())),
        }
    }

    #[cfg(feature = "redis-backend")]
    async fn redis(backend: &str) -> Result<Option<Self>, EventBusError> {
        use super::redis::{connect, RedisEventQueue, RedisEventTopic};

        if !(backend.starts_with("redis://") || backend.starts_with("rediss://")) {
            return Ok(None);
        }
        let conn = connect(backend).await?;
        Ok(Some(Self::new(
            Arc::new(RedisEventQueue::new(conn.clone())),
            Arc::new(RedisEventTopic::new(conn)),
        )))
    }

    #[cfg(not(feature = "redis-backend"))]
    async fn redis(_backend: &str) -> Result<Option<Self>, EventBusError> {
        Ok(None)
    }

    /// Pop the next decodable event. Malformed payloads are dropped.
    pub async fn next_event(&self) -> Result<Option<DomainEvent>, EventBusError> {
        while let Some(payload) = self.queue.pop().await? {
            match DomainEvent::from_json(&payload) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("Dropping malformed event payload: {} ({})", payload, e),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: &DomainEvent) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode event for listing {}: {}", event.listing_id, e);
                return;
            }
        };

        if let Err(e) = self.queue.push(&payload).await {
            error!(
                "[{}] Failed to enqueue {} event for listing {}: {}",
                event.source,
                event.kind.as_str(),
                event.listing_id,
                e
            );
        }
        if let Err(e) = self.topic.broadcast(&payload).await {
            warn!("[{}] Failed to broadcast event: {}", event.source, e);
        }
        debug!(
            "[{}] Published {} for listing {}",
            event.source,
            event.kind.as_str(),
            event.listing_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_publish_reaches_queue_and_topic() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let topic = BroadcastTopic::new();
        let mut rx = topic.subscribe();
        let bus = EventBus::database(&ctx, topic);

        bus.publish(&DomainEvent::price_drop(3, "sreality", 100.0)).await;

        let live = rx.recv().await.unwrap();
        assert!(live.contains("price_drop"));
        let queued = bus.next_event().await.unwrap().unwrap();
        assert_eq!(queued.listing_id, 3);
        assert_eq!(queued.old_price, Some(100.0));
        assert!(bus.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        ctx.event_queue().push("not json").await.unwrap();

        let bus = EventBus::database(&ctx, BroadcastTopic::new());
        bus.publish(&DomainEvent::new_listing(9, "idnes")).await;
        assert_eq!(bus.next_event().await.unwrap().unwrap().listing_id, 9);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        let result = EventBus::from_backend("kafka://x", &ctx, BroadcastTopic::new()).await;
        assert!(matches!(result, Err(EventBusError::UnsupportedBackend(_))));
    }
}
