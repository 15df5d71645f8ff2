//! Token bucket.

use std::time::{Duration, Instant};

use super::algorithm::RateLimitAlgorithm;
use super::clock::SharedClock;

/// Admits a request while at least one token remains.
///
/// Tokens refill at `limit / window`, in whole tokens, and only when a request
/// arrives. The bucket never holds more than `limit` tokens. A refill moves
/// `last_refill` to the current instant, so the fractional remainder of the
/// elapsed interval is dropped.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    window: Duration,
    tokens: u64,
    /// `None` until the first request fills the bucket
    last_refill: Option<Instant>,
    clock: SharedClock,
}

impl TokenBucket {
    /// Create a new token bucket holding `limit` tokens per `window`.
    pub fn new(limit: u64, window: Duration, clock: SharedClock) -> Self {
        Self {
            capacity: limit,
            window,
            tokens: 0,
            last_refill: None,
            clock,
        }
    }

    /// Whole tokens earned over `elapsed`.
    fn tokens_for(&self, elapsed: Duration) -> u64 {
        let window_nanos = self.window.as_nanos();
        if window_nanos == 0 {
            return self.capacity;
        }
        let earned = elapsed.as_nanos() * u128::from(self.capacity) / window_nanos;
        u64::try_from(earned).unwrap_or(u64::MAX)
    }

    /// Token count as of `now`, with the instant the refill would be stamped at.
    fn refilled(&self, now: Instant) -> (u64, Instant) {
        match self.last_refill {
            None => (self.capacity, now),
            Some(last) => {
                let new_tokens = self.tokens_for(now.saturating_duration_since(last));
                if new_tokens > 0 {
                    (self.tokens.saturating_add(new_tokens).min(self.capacity), now)
                } else {
                    (self.tokens, last)
                }
            }
        }
    }
}

impl RateLimitAlgorithm for TokenBucket {
    fn try_acquire(&mut self) -> bool {
        let (tokens, last_refill) = self.refilled(self.clock.now());
        self.tokens = tokens;
        self.last_refill = Some(last_refill);

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn available(&self) -> u64 {
        self.refilled(self.clock.now()).0
    }

    fn limit(&self) -> u64 {
        self.capacity
    }

    fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use std::sync::Arc;

    fn bucket(limit: u64, window_secs: u64) -> (TokenBucket, MockClock) {
        let clock = MockClock::new();
        let bucket = TokenBucket::new(
            limit,
            Duration::from_secs(window_secs),
            Arc::new(clock.clone()),
        );
        (bucket, clock)
    }

    #[test]
    fn test_fresh_bucket_is_full() {
        let (mut bucket, _clock) = bucket(5, 10);
        assert_eq!(bucket.available(), 5);

        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_refills_to_capacity_after_window() {
        let (mut bucket, clock) = bucket(5, 10);
        for _ in 0..6 {
            bucket.try_acquire();
        }

        clock.advance(Duration::from_secs(10));
        assert_eq!(bucket.available(), 5);
        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_capped_after_long_idle() {
        let (mut bucket, clock) = bucket(5, 10);
        bucket.try_acquire();

        clock.advance(Duration::from_secs(3_600));
        assert_eq!(bucket.available(), 5);
        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_partial_refill_in_whole_tokens() {
        // One token every two seconds
        let (mut bucket, clock) = bucket(5, 10);
        for _ in 0..5 {
            bucket.try_acquire();
        }

        clock.advance(Duration::from_millis(1_900));
        assert!(!bucket.try_acquire());

        clock.advance(Duration::from_millis(100));
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_refill_drops_fractional_remainder() {
        let (mut bucket, clock) = bucket(5, 10);
        for _ in 0..5 {
            bucket.try_acquire();
        }

        // 3.9s earns one token; the extra 1.9s is discarded
        clock.advance(Duration::from_millis(3_900));
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        clock.advance(Duration::from_millis(1_900));
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_premium_rate_50_per_minute() {
        let (mut bucket, clock) = bucket(50, 60);
        for _ in 0..50 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());

        clock.advance(Duration::from_millis(1_200));
        assert!(bucket.try_acquire());
    }
}
