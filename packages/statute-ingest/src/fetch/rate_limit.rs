//! Process-wide politeness limiter for outbound scraping.
//!
//! Wraps a governor rate limiter with a quota of one request per
//! `min_delay` and no burst, so every `throttle()` is spaced at least
//! `min_delay` after the previous one. Concurrent callers queue on the same
//! limiter and are released one period apart.

use governor::{Quota, RateLimiter as GovernorLimiter};
use std::time::Duration;
use tracing::debug;

use crate::types::config::DEFAULT_MIN_DELAY;

type DefaultRateLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Enforces a minimum delay between outbound requests.
///
/// Share one instance per scraping session (`Arc<RateLimiter>`).
pub struct RateLimiter {
    min_delay: Duration,
    limiter: Option<DefaultRateLimiter>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

impl RateLimiter {
    /// Create a limiter. A zero delay disables throttling.
    pub fn new(min_delay: Duration) -> Self {
        let limiter = Quota::with_period(min_delay).map(GovernorLimiter::direct);
        Self { min_delay, limiter }
    }

    /// Create with a delay in milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait until the next request slot is available.
    pub async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!(min_delay_ms = self.min_delay.as_millis() as u64, "Throttling request");
                limiter.until_ready().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_call_is_immediate() {
        let limiter = RateLimiter::from_millis(500);

        let start = Instant::now();
        limiter.throttle().await;

        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let limiter = RateLimiter::from_millis(200);

        let start = Instant::now();
        limiter.throttle().await;
        limiter.throttle().await;
        limiter.throttle().await;

        // First is immediate, the next two wait one period each
        assert!(
            start.elapsed() >= Duration::from_millis(350),
            "Rate limiting not working: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::from_millis(150));

        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.throttle().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[2] >= Duration::from_millis(250), "{:?}", finished);
    }

    #[tokio::test]
    async fn test_zero_delay_disables_throttling() {
        let limiter = RateLimiter::new(Duration::ZERO);

        let start = Instant::now();
        for _ in 0..10 {
            limiter.throttle().await;
        }

        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
