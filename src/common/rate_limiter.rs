//! Minimum-interval rate limiter
//!
//! Each exchange client owns one limiter. Before every request the client
//! awaits [`RateLimiter::acquire`], which sleeps until at least the configured
//! interval has passed since the previous request.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum spacing between two requests
    pub min_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

/// Limiter holding the instant of the last request.
///
/// Clones share state, so a client and its clones are throttled together.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last_request: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            last_request: Arc::new(Mutex::new(None)),
            min_interval: config.min_interval,
        }
    }

    pub fn with_min_interval(interval: Duration) -> Self {
        Self::new(RateLimiterConfig::default().with_min_interval(interval))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request is allowed, then record it as sent now.
    ///
    /// The lock is held across the sleep so concurrent callers queue up.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
