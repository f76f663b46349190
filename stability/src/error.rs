//! Error types for stability

use thiserror::Error;

/// Result type alias for stability operations
pub type Result<T> = std::result::Result<T, StabilityError>;

/// What every remote operation and decorator returns
///
/// An `Err` means the string result is unset and must not be used.
pub type OperationResult = Result<String>;

/// Failure taxonomy shared by every decorator
///
/// `Clone` because debounced decorators hand the same cached failure to
/// every caller inside a window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StabilityError {
    /// The governing context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The governing context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Circuit breaker is open; the wrapped operation was not invoked
    #[error("service is unavailable")]
    ServiceUnavailable,

    /// Throttle has no tokens left for the current interval
    #[error("too many calls")]
    TooManyCalls,

    /// Failure reported by the wrapped operation itself
    #[error("remote operation failed: {0}")]
    Remote(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl StabilityError {
    /// Shorthand for a wrapped-operation failure
    pub fn remote(message: impl Into<String>) -> Self {
        StabilityError::Remote(message.into())
    }

    /// True for `Cancelled` and `DeadlineExceeded`
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            StabilityError::Cancelled | StabilityError::DeadlineExceeded
        )
    }

    /// True for failures synthesized by a decorator rather than the wrapped operation
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            StabilityError::ServiceUnavailable | StabilityError::TooManyCalls
        ) || self.is_cancellation()
    }
}
