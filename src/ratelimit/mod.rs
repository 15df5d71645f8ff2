//! Rate limiting algorithms, policy resolution and the per-caller registry.

mod algorithm;
mod clock;
mod counter;
mod error;
mod factory;
mod policy;
mod registry;
mod sliding;
mod token_bucket;

pub use algorithm::{AlgorithmKind, Limiter, RateLimitAlgorithm};
pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use counter::FixedCounter;
pub use error::RateLimitError;
pub use factory::create_limiter;
pub use policy::{builtin_policy, PolicyConfig, PolicyFile, PolicyRule, PolicyTable, Tier};
pub use registry::{Caller, CallerId, LimiterRegistry};
pub use sliding::SlidingWindowLog;
pub use token_bucket::TokenBucket;
