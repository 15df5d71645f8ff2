//! Failures raised while resolving a caller's limiter.

use thiserror::Error;

use super::algorithm::AlgorithmKind;
use super::policy::Tier;

/// Errors from policy resolution and limiter construction.
///
/// A rejected request is not an error; these indicate a configuration or
/// caller bug and are never retried by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Tier name not recognized, or no policy configured for the tier
    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    /// The policy names an algorithm with no implementation
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(AlgorithmKind),

    /// A policy entry violates the limit/window constraints
    #[error("Invalid policy for tier {tier}: {reason}")]
    InvalidPolicy { tier: Tier, reason: String },
}
