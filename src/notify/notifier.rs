//! Message delivery channels.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::info;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Sends a rendered message to a subscriber.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, target: &str, message: &str) -> Result<(), DeliveryError>;
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, target: &str, message: &str) -> Result<(), DeliveryError> {
        info!("Notification for {}:\n{}", target, message);
        Ok(())
    }
}

/// Telegram Bot API `sendMessage` with HTML parse mode.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: TELEGRAM_API.to_string(),
        })
    }

    /// Point at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, target: &str, message: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.send_url())
            .json(&json!({
                "chat_id": target,
                "text": message,
                "parse_mode": "HTML",
                "disable_web_page_preview": false,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_url() {
        let notifier = TelegramNotifier::new("123:abc")
            .unwrap()
            .with_api_base("http://localhost:8081/");
        assert_eq!(
            notifier.send_url(),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.deliver("42", "<b>hi</b>").await.is_ok());
    }
}
