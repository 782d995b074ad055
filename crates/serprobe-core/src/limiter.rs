//! Process-wide request spacing.
//!
//! Enforces a minimum interval between outbound requests, with random
//! jitter on top so request timing doesn't form a detectable pattern.
//! A single shared "last request" instant is updated before release;
//! waiting suspends only the calling task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::util::rand_below;

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Minimum spacing between consecutive outbound requests.
    pub min_interval: Duration,
    /// Maximum random jitter added on top (uniform [0, jitter]).
    pub jitter: Duration,
}

impl LimiterConfig {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_interval(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_interval;
        }
        self.min_interval + Duration::from_millis(rand_below(self.jitter.as_millis() as u64))
    }
}

impl Default for LimiterConfig {
    /// 5 second spacing, up to 2 seconds of jitter.
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            jitter: Duration::from_secs(2),
        }
    }
}

/// Shared rate limiter. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct RateLimiter {
    config: LimiterConfig,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Suspend until the minimum spacing has elapsed since the previous
    /// request, then record the current time as the new last request.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            let required = self.config.effective_interval();
            if elapsed < required {
                let sleep_for = required - elapsed;
                tracing::debug!(sleep_ms = %sleep_for.as_millis(), "Rate limiting request");
                // Hold the lock while sleeping: spacing is per process, so
                // concurrent callers must queue behind this wait.
                tokio::time::sleep(sleep_for).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_interval_without_jitter() {
        let config = LimiterConfig::new(Duration::from_secs(1));
        assert_eq!(config.effective_interval(), Duration::from_secs(1));
    }

    #[test]
    fn effective_interval_with_jitter_is_bounded() {
        let config =
            LimiterConfig::new(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let d = config.effective_interval();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn wait_enforces_spacing() {
        let limiter = RateLimiter::new(LimiterConfig::new(Duration::from_millis(100)));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(100),
            "second request should have been delayed, elapsed: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn first_wait_is_immediate() {
        let limiter = RateLimiter::new(LimiterConfig::new(Duration::from_secs(5)));

        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let limiter = RateLimiter::new(LimiterConfig::new(Duration::from_millis(80)));
        let other = limiter.clone();

        let start = Instant::now();
        limiter.wait().await;
        other.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
