//! ResilientOperation builder for composing decorators
//!
//! Provides a fluent API for wrapping an operation with retry, circuit breaker,
//! throttle and debounce.

use super::{
    CircuitBreaker, CircuitBreakerConfig, DebounceFirst, DebounceLast, Retry, RetryConfig,
    Throttle, ThrottleConfig,
};
use crate::operation::RemoteOperation;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Debounce {
    First(Duration),
    Last(Duration),
}

/// Builder for composing decorators around an operation
///
/// # Example
///
/// ```ignore
/// let resilient = ResilientOperation::wrap(SimulatedOperation::new("orders"))
///     .with_retry(RetryConfig::default())
///     .with_circuit_breaker(CircuitBreakerConfig::default())
///     .with_debounce_first(Duration::from_millis(250))
///     .build();
/// ```
pub struct ResilientOperation {
    inner: Arc<dyn RemoteOperation>,
    retry_config: Option<RetryConfig>,
    circuit_breaker_config: Option<CircuitBreakerConfig>,
    throttle_config: Option<ThrottleConfig>,
    debounce: Option<Debounce>,
}

impl ResilientOperation {
    /// Start building a resilient stack
    pub fn wrap<O: RemoteOperation + 'static>(operation: O) -> Self {
        Self::wrap_arc(Arc::new(operation))
    }

    /// Start building from an Arc<dyn RemoteOperation>
    pub fn wrap_arc(operation: Arc<dyn RemoteOperation>) -> Self {
        Self {
            inner: operation,
            retry_config: None,
            circuit_breaker_config: None,
            throttle_config: None,
            debounce: None,
        }
    }

    /// Add retry
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Add retry with default configuration
    pub fn with_default_retry(self) -> Self {
        self.with_retry(RetryConfig::default())
    }

    /// Add circuit breaker
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker_config = Some(config);
        self
    }

    /// Add throttle
    pub fn with_throttle(mut self, config: ThrottleConfig) -> Self {
        self.throttle_config = Some(config);
        self
    }

    /// Serve the first result of each window (replaces any debounce set before)
    pub fn with_debounce_first(mut self, window: Duration) -> Self {
        self.debounce = Some(Debounce::First(window));
        self
    }

    /// Defer one call until callers go quiet (replaces any debounce set before)
    pub fn with_debounce_last(mut self, window: Duration) -> Self {
        self.debounce = Some(Debounce::Last(window));
        self
    }

    /// Build the decorated stack
    ///
    /// Composition order (inside-out):
    /// 1. Inner operation
    /// 2. Retry (if configured) - absorbs transient failures
    /// 3. CircuitBreaker (if configured) - counts only failures that survived retry
    /// 4. Throttle (if configured) - one token per logical call, not per attempt
    /// 5. Debounce (if configured) - collapses bursts before they spend tokens
    pub fn build(self) -> Arc<dyn RemoteOperation> {
        let mut current: Arc<dyn RemoteOperation> = self.inner;

        if let Some(config) = self.retry_config {
            current = Arc::new(Retry::with_config(current, config));
        }

        if let Some(config) = self.circuit_breaker_config {
            current = Arc::new(CircuitBreaker::with_config(current, config));
        }

        if let Some(config) = self.throttle_config {
            current = Arc::new(Throttle::with_config(current, config));
        }

        match self.debounce {
            Some(Debounce::First(window)) => {
                current = Arc::new(DebounceFirst::new(current, window));
            }
            Some(Debounce::Last(window)) => {
                current = Arc::new(DebounceLast::new(current, window));
            }
            None => {}
        }

        current
    }
}
