//! HTTP client with per-domain pacing and bounded retries.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::rate_limiter::RateLimiter;

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; realitytracker/0.4)";

/// Browser user agent for portals that reject obvious bots.
const IMPERSONATE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Resolve user agent from config value.
/// - None => default user agent
/// - "impersonate" => desktop browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => IMPERSONATE_USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

/// Attempts and linear backoff between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Wait after failed attempt `n` is `backoff_unit * n`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts run out.
    pub async fn run<T, F, Fut>(&self, url: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let attempts = self.attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Fetch attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
                    last = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff_unit * attempt).await;
                    }
                }
            }
        }
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(
        timeout: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent_config))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            rate_limiter,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying reqwest client, for calls that skip pacing.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn get_once(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.rate_limiter.acquire(url).await;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET a JSON document, retrying per the policy.
    pub async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.retry
            .run(url, || async {
                let response = self.get_once(url).await?;
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| FetchError::Decode(e.to_string()))
            })
            .await
    }

    /// GET a page body as text, retrying per the policy.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.retry
            .run(url, || async {
                let response = self.get_once(url).await?;
                Ok(response.text().await?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff_unit: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_resolve_user_agent() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert!(resolve_user_agent(Some("impersonate")).contains("Chrome"));
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("http://x", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Status {
                        url: "http://x".into(),
                        status: 503,
                    })
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("http://x", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Decode("bad".into()))
            })
            .await;
        assert!(matches!(result, Err(FetchError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
