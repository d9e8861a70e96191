//! Redis list queue and pub/sub topic for multi-process deployments.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{EventBusError, EventQueue, EventTopic, QUEUE_KEY, TOPIC_CHANNEL};

/// Connect once; the manager reconnects on its own.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, EventBusError> {
    let client = redis::Client::open(redis_url)?;
    Ok(ConnectionManager::new(client).await?)
}

#[derive(Clone)]
pub struct RedisEventQueue {
    conn: ConnectionManager,
}

impl RedisEventQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventQueue for RedisEventQueue {
    async fn push(&self, payload: &str) -> Result<(), EventBusError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH")
            .arg(QUEUE_KEY)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>, EventBusError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = redis::cmd("LPOP")
            .arg(QUEUE_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(payload)
    }
}

#[derive(Clone)]
pub struct RedisEventTopic {
    conn: ConnectionManager,
}

impl RedisEventTopic {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl EventTopic for RedisEventTopic {
    async fn broadcast(&self, payload: &str) -> Result<(), EventBusError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(TOPIC_CHANNEL)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
