//! Per-domain request pacing.
//!
//! Every request to a domain waits until the configured delay has passed
//! since the previous request to that domain. Clones share state, so one
//! limiter handed to several adapters paces them together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Pause between page requests to the same portal.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    delay: Duration,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_DELAY)
    }
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain may be hit again, then claim the slot.
    ///
    /// The slot is reserved before sleeping so concurrent callers queue
    /// behind each other instead of firing together.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let ready_at = last
                .get(&domain)
                .map(|prev| *prev + self.delay)
                .filter(|at| *at > now)
                .unwrap_or(now);
            last.insert(domain.clone(), ready_at);
            ready_at.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!("Pacing {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        Some(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://www.sreality.cz/api/cs/v2/estates?page=1"),
            Some("www.sreality.cz".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_second_request_waits_for_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();

        limiter.acquire("https://example.cz/a").await;
        limiter.acquire("https://other.cz/a").await;
        assert!(start.elapsed() < Duration::from_millis(200));

        limiter.acquire("https://example.cz/b").await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
