//! SQLite-backed event queue.

use async_trait::async_trait;

use super::{EventBusError, EventQueue};
use crate::repository::EventQueueRepository;

#[derive(Clone)]
pub struct DbEventQueue {
    repo: EventQueueRepository,
}

impl DbEventQueue {
    pub fn new(repo: EventQueueRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl EventQueue for DbEventQueue {
    async fn push(&self, payload: &str) -> Result<(), EventBusError> {
        Ok(self.repo.push(payload).await?)
    }

    async fn pop(&self) -> Result<Option<String>, EventBusError> {
        Ok(self.repo.pop().await?)
    }
}
