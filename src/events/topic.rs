//! In-process broadcast topic.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{EventBusError, EventTopic};

const CAPACITY: usize = 256;

/// Broadcast channel; payloads sent with no subscribers are dropped.
#[derive(Clone)]
pub struct BroadcastTopic {
    sender: broadcast::Sender<String>,
}

impl Default for BroadcastTopic {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastTopic {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventTopic for BroadcastTopic {
    async fn broadcast(&self, payload: &str) -> Result<(), EventBusError> {
        if self.sender.send(payload.to_string()).is_err() {
            debug!("No topic subscribers, event dropped");
        }
        Ok(())
    }
}
