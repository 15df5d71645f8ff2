//! Error types for Tollgate.

use thiserror::Error;

use crate::ratelimit::RateLimitError;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Policy resolution or limiter construction errors
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
