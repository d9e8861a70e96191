//! Event fan-out: a durable FIFO queue plus a best-effort broadcast topic,
//! both fed by one `publish`.

pub mod bus;
pub mod queue;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod topic;

pub use bus::EventBus;
pub use queue::DbEventQueue;
pub use topic::BroadcastTopic;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::DomainEvent;
use crate::repository::DbError;

/// Redis list drained by the notification worker.
pub const QUEUE_KEY: &str = "property_events";
/// Pub/sub channel for live listeners.
pub const TOPIC_CHANNEL: &str = "property_updates";

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("event encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[cfg(feature = "redis-backend")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("unsupported event backend: {0}")]
    UnsupportedBackend(String),
}

/// Where ingestion publishes events. Failures are logged, never returned.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &DomainEvent);
}

/// Durable FIFO of serialized events.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn push(&self, payload: &str) -> Result<(), EventBusError>;
    async fn pop(&self) -> Result<Option<String>, EventBusError>;
}

/// Fire-and-forget fan-out to whoever is listening.
#[async_trait]
pub trait EventTopic: Send + Sync {
    async fn broadcast(&self, payload: &str) -> Result<(), EventBusError>;
}
