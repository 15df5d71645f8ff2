//! Sliding window log.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::algorithm::RateLimitAlgorithm;
use super::clock::SharedClock;

/// Admits up to `limit` requests within any trailing window.
///
/// Keeps the timestamp of every admission still inside the window, oldest
/// first, so memory grows with the limit rather than with request volume.
#[derive(Debug)]
pub struct SlidingWindowLog {
    limit: u64,
    window: Duration,
    admitted: VecDeque<Instant>,
    clock: SharedClock,
}

impl SlidingWindowLog {
    /// Create a new sliding window log.
    pub fn new(limit: u64, window: Duration, clock: SharedClock) -> Self {
        Self {
            limit,
            window,
            admitted: VecDeque::new(),
            clock,
        }
    }

    /// Drop admissions that have aged out of the window.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of admissions inside the trailing window ending at `now`.
    fn live_admissions(&self, now: Instant) -> u64 {
        self.admitted
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) < self.window)
            .count() as u64
    }
}

impl RateLimitAlgorithm for SlidingWindowLog {
    fn try_acquire(&mut self) -> bool {
        let now = self.clock.now();
        self.expire(now);

        if (self.admitted.len() as u64) < self.limit {
            self.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    fn available(&self) -> u64 {
        self.limit
            .saturating_sub(self.live_admissions(self.clock.now()))
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    fn window(&self) -> Duration {
        self.window
    }
}
