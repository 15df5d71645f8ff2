//! Algorithm kinds and the limiter instance dispatched over them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::counter::FixedCounter;
use super::sliding::SlidingWindowLog;
use super::token_bucket::TokenBucket;

/// The rate limiting algorithms a policy can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Quantized window counted from the first request that opens it
    FixedCounter,
    /// Log of admitted timestamps over a trailing window
    SlidingWindow,
    /// Continuously refilled bucket capped at the limit
    TokenBucket,
    /// Declared for policy files; the factory has no implementation for it
    LeakyBucket,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::FixedCounter => "fixed_counter",
            AlgorithmKind::SlidingWindow => "sliding_window",
            AlgorithmKind::TokenBucket => "token_bucket",
            AlgorithmKind::LeakyBucket => "leaky_bucket",
        };
        f.write_str(name)
    }
}

/// Admission contract shared by every algorithm.
///
/// Each implementation owns the state for exactly one caller and reads time
/// from the clock it was constructed with.
pub trait RateLimitAlgorithm: Send {
    /// Decide whether one request may proceed, updating internal state.
    ///
    /// Only admitted requests consume capacity.
    fn try_acquire(&mut self) -> bool;

    /// Admissions still available at the current clock reading.
    ///
    /// Does not mutate state.
    fn available(&self) -> u64;

    /// Maximum admissions per window.
    fn limit(&self) -> u64;

    /// The window the limit applies to.
    fn window(&self) -> Duration;
}

/// A limiter instance bound to one caller.
#[derive(Debug)]
pub enum Limiter {
    FixedCounter(FixedCounter),
    SlidingWindow(SlidingWindowLog),
    TokenBucket(TokenBucket),
}

impl Limiter {
    /// The algorithm backing this instance.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Limiter::FixedCounter(_) => AlgorithmKind::FixedCounter,
            Limiter::SlidingWindow(_) => AlgorithmKind::SlidingWindow,
            Limiter::TokenBucket(_) => AlgorithmKind::TokenBucket,
        }
    }
}

impl RateLimitAlgorithm for Limiter {
    fn try_acquire(&mut self) -> bool {
        match self {
            Limiter::FixedCounter(l) => l.try_acquire(),
            Limiter::SlidingWindow(l) => l.try_acquire(),
            Limiter::TokenBucket(l) => l.try_acquire(),
        }
    }

    fn available(&self) -> u64 {
        match self {
            Limiter::FixedCounter(l) => l.available(),
            Limiter::SlidingWindow(l) => l.available(),
            Limiter::TokenBucket(l) => l.available(),
        }
    }

    fn limit(&self) -> u64 {
        match self {
            Limiter::FixedCounter(l) => l.limit(),
            Limiter::SlidingWindow(l) => l.limit(),
            Limiter::TokenBucket(l) => l.limit(),
        }
    }

    fn window(&self) -> Duration {
        match self {
            Limiter::FixedCounter(l) => l.window(),
            Limiter::SlidingWindow(l) => l.window(),
            Limiter::TokenBucket(l) => l.window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use std::sync::Arc;

    #[test]
    fn test_algorithm_kind_display_matches_serde_names() {
        for kind in [
            AlgorithmKind::FixedCounter,
            AlgorithmKind::SlidingWindow,
            AlgorithmKind::TokenBucket,
            AlgorithmKind::LeakyBucket,
        ] {
            let yaml = serde_yaml::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.to_string());
        }
    }

    #[test]
    fn test_limiter_dispatch() {
        let clock = Arc::new(MockClock::new());
        let mut limiter = Limiter::SlidingWindow(SlidingWindowLog::new(
            2,
            Duration::from_secs(1),
            clock,
        ));

        assert_eq!(limiter.kind(), AlgorithmKind::SlidingWindow);
        assert_eq!(limiter.limit(), 2);
        assert_eq!(limiter.window(), Duration::from_secs(1));
        assert!(limiter.try_acquire());
        assert_eq!(limiter.available(), 1);
    }
}
