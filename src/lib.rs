//! Tollgate - Tier-based Admission Control
//!
//! This crate decides, per caller, whether a request may proceed. Each caller
//! is bound to one rate limiting algorithm (fixed counter, sliding window log
//! or token bucket) chosen by the policy of its tier, and the limiter is
//! rebuilt from scratch whenever the caller's tier changes.

pub mod config;
pub mod error;
pub mod ratelimit;
