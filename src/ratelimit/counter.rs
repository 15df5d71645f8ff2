//! Fixed window counter.

use std::time::{Duration, Instant};

use super::algorithm::RateLimitAlgorithm;
use super::clock::SharedClock;

/// Admits up to `limit` requests per window, where a window opens on the
/// first request after the previous one expired.
///
/// Windows roll over lazily, so up to twice the limit can be admitted across
/// a boundary within one window's worth of wall-clock time.
#[derive(Debug)]
pub struct FixedCounter {
    /// Admissions allowed per window
    limit: u64,
    /// Length of a window
    window: Duration,
    /// When the current window opened, `None` before first use
    window_start: Option<Instant>,
    /// Admissions in the current window
    count: u64,
    clock: SharedClock,
}

impl FixedCounter {
    /// Create a new fixed counter.
    pub fn new(limit: u64, window: Duration, clock: SharedClock) -> Self {
        Self {
            limit,
            window,
            window_start: None,
            count: 0,
            clock,
        }
    }

    /// Get the number of admissions in the current window.
    pub fn current_count(&self) -> u64 {
        if self.window_expired(self.clock.now()) {
            0
        } else {
            self.count
        }
    }

    fn window_expired(&self, now: Instant) -> bool {
        match self.window_start {
            Some(start) => now.saturating_duration_since(start) >= self.window,
            None => true,
        }
    }
}

impl RateLimitAlgorithm for FixedCounter {
    fn try_acquire(&mut self) -> bool {
        let now = self.clock.now();
        if self.window_expired(now) {
            self.window_start = Some(now);
            self.count = 0;
        }

        if self.count < self.limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    fn available(&self) -> u64 {
        self.limit.saturating_sub(self.current_count())
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }
}
