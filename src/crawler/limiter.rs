//! Per-job request rate limiter
//!
//! Bounds how many fetches of one discovery job are in flight and spaces
//! them out with a fixed delay after each completed request.

use crate::config::RateLimitConfig;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Concurrency and spacing governor for outbound fetches
///
/// A permit is held for the whole duration of the wrapped operation plus the
/// post-request delay, so `max_concurrent` bounds both in-flight requests and
/// their cool-down.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Semaphore,
    delay_ms: AtomicU64,
    max_delay_ms: u64,
}

impl RateLimiter {
    /// Creates a limiter
    ///
    /// `max_delay` caps any crawl delay later requested through
    /// [`RateLimiter::respect_crawl_delay`].
    pub fn new(max_concurrent: usize, delay: Duration, max_delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            delay_ms: AtomicU64::new(delay_ms),
            max_delay_ms: (max_delay.as_millis() as u64).max(delay_ms),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_concurrent_requests as usize,
            Duration::from_millis(config.request_delay_ms),
            Duration::from_millis(config.max_crawl_delay_ms),
        )
    }

    /// Runs `operation` once a permit is available, then sleeps the current
    /// delay before releasing the permit
    pub async fn run<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        // The semaphore is never closed, so acquire only fails if that
        // changes; run unthrottled rather than dropping the request
        let permit = self.semaphore.acquire().await.ok();

        let output = operation.await;

        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        drop(permit);
        output
    }

    /// Current delay applied after each request
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    /// Raises the delay to a robots.txt `Crawl-delay` (in seconds)
    ///
    /// The delay never decreases and never exceeds the configured maximum.
    pub fn respect_crawl_delay(&self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            return;
        }

        let requested = (seconds * 1000.0).min(self.max_delay_ms as f64) as u64;
        let previous = self.delay_ms.fetch_max(requested, Ordering::Relaxed);

        if requested > previous {
            tracing::debug!(
                "Raised request delay from {}ms to {}ms for crawl-delay {}s",
                previous,
                requested,
                seconds
            );
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
