//! Throughput estimation over a rolling refresh window.
//!
//! [`RateCalculator`] counts events and, once at least `refresh_interval` has
//! elapsed since the last refresh, yields `events / elapsed_seconds` and starts
//! a new window. Time comes from `tokio::time::Instant`, which is monotonic
//! (and follows the paused clock in tests).

use std::time::Duration;
use tokio::time::Instant;

/// Event counter that yields an events-per-second estimate once per window.
#[derive(Debug, Clone)]
pub struct RateCalculator {
    refresh_interval: Duration,
    count: u64,
    last_refresh: Instant,
}

impl RateCalculator {
    /// Create a calculator whose first window starts now.
    pub fn new(refresh_interval: Duration) -> Self {
        Self::starting_at(refresh_interval, Instant::now())
    }

    /// Create a calculator whose first window starts at `start`.
    pub fn starting_at(refresh_interval: Duration, start: Instant) -> Self {
        Self {
            refresh_interval,
            count: 0,
            last_refresh: start,
        }
    }

    /// Record one event.
    pub fn update(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Yield the rate for the current window if it has lasted long enough.
    pub fn refresh(&mut self) -> Option<f64> {
        self.refresh_at(Instant::now())
    }

    /// Same as [`refresh`](Self::refresh) with an explicit clock reading.
    ///
    /// A reading earlier than the window start counts as zero elapsed time.
    pub fn refresh_at(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_refresh);
        if elapsed < self.refresh_interval || elapsed.is_zero() {
            return None;
        }

        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.last_refresh = now;
        Some(rate)
    }

    /// Configured window length.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
