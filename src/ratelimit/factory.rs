//! Construction of limiter instances from a policy.

use super::algorithm::{AlgorithmKind, Limiter};
use super::clock::SharedClock;
use super::counter::FixedCounter;
use super::error::RateLimitError;
use super::policy::PolicyConfig;
use super::sliding::SlidingWindowLog;
use super::token_bucket::TokenBucket;

/// Build a fresh limiter for `policy`, reading time from `clock`.
pub fn create_limiter(policy: &PolicyConfig, clock: SharedClock) -> Result<Limiter, RateLimitError> {
    let PolicyConfig {
        limit,
        window,
        algorithm,
    } = *policy;

    match algorithm {
        AlgorithmKind::FixedCounter => Ok(Limiter::FixedCounter(FixedCounter::new(limit, window, clock))),
        AlgorithmKind::SlidingWindow => Ok(Limiter::SlidingWindow(SlidingWindowLog::new(
            limit, window, clock,
        ))),
        AlgorithmKind::TokenBucket => Ok(Limiter::TokenBucket(TokenBucket::new(limit, window, clock))),
        AlgorithmKind::LeakyBucket => Err(RateLimitError::UnsupportedAlgorithm(algorithm)),
    }
}
