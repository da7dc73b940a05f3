//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// A denied check is not an error: it is reported through
/// [`RateLimitDecision`](crate::ratelimit::RateLimitDecision).
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid limiter or service configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter name that is not part of the registry
    #[error("Unknown limiter: {0}")]
    UnknownLimiter(String),

    /// Cleanup scheduler lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
