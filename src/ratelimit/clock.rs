//! Time sources for the rate limiting algorithms.
//!
//! Algorithms never read the system clock directly. Each limiter is handed a
//! shared [`Clock`] at construction so tests can drive time explicitly with
//! [`MockClock`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of monotonically non-decreasing timestamps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Shared handle to a clock, as stored by every limiter.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// pass another to the registry.
///
/// ```
/// use tollgate::ratelimit::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock frozen at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a mock clock frozen at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }

    /// Set the clock to `instant`.
    ///
    /// Moving backwards is ignored; the clock only ever goes forward.
    pub fn set(&self, instant: Instant) {
        let mut current = self.current.lock();
        if instant > *current {
            *current = instant;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
