//! Request pacing
//!
//! The harvester is strictly sequential, so pacing reduces to one rule: a
//! minimum interval between the start of consecutive catalog requests. There
//! is no jitter and nothing runs while the limiter waits.

use crate::config::CrawlerConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive requests
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Option<Instant>,
    request_count: u64,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: None,
            request_count: 0,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(Duration::from_millis(config.request_interval_ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Requests paced so far
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Forgets the last request, so the next one goes out immediately
    ///
    /// Called at the start of each phase.
    pub fn reset(&mut self) {
        self.last_request = None;
    }

    /// Time left before the next request may start
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.interval {
            Some(self.interval - elapsed)
        } else {
            None
        }
    }

    /// Waits out the interval, then records the request as started
    pub async fn pace(&mut self) {
        if let Some(delay) = self.time_until_next_request(Instant::now()) {
            tracing::trace!("Rate limiter waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
        self.record_request(Instant::now());
    }

    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request = Some(now);
    }
}
