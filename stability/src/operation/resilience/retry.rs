//! Retry decorator
//!
//! Calls the wrapped operation until it succeeds or the attempt budget is
//! spent, sleeping a fixed delay between attempts. The sleep is raced against
//! the caller's context, so cancellation ends the loop immediately.
//!
//! Every failure is retried; there is no retryable/permanent classification.
//! Put a [`super::CircuitBreaker`] inside the retry to stop hammering a
//! backend that is down.

use crate::context::CallContext;
use crate::error::OperationResult;
use crate::metrics::{Outcome, try_record_outcome};
use crate::operation::RemoteOperation;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DECORATOR: &str = "retry";

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first (0 behaves like 1)
    pub max_attempts: u32,
    /// Pause between attempts, never after the last one
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Decorator that repeats a failing operation up to a bound
pub struct Retry {
    inner: Arc<dyn RemoteOperation>,
    config: RetryConfig,
}

impl Retry {
    /// Wrap `inner`, making at most `max_attempts` calls spaced by `delay`
    pub fn new(inner: Arc<dyn RemoteOperation>, max_attempts: u32, delay: Duration) -> Self {
        Self::with_config(
            inner,
            RetryConfig {
                max_attempts,
                delay,
            },
        )
    }

    /// Wrap `inner` with a full configuration
    pub fn with_config(inner: Arc<dyn RemoteOperation>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteOperation for Retry {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        let mut attempt: u32 = 1;

        loop {
            let error = match self.inner.call(ctx).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = self.inner.name(),
                            attempt, "succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if attempt >= self.config.max_attempts {
                warn!(
                    operation = self.inner.name(),
                    attempt,
                    error = %error,
                    "retry budget exhausted"
                );
                return Err(error);
            }

            warn!(
                operation = self.inner.name(),
                attempt,
                delay = ?self.config.delay,
                error = %error,
                "attempt failed, retrying"
            );
            try_record_outcome(DECORATOR, Outcome::Retried);

            tokio::select! {
                reason = ctx.done() => {
                    debug!(operation = self.inner.name(), attempt, "retry wait cancelled");
                    try_record_outcome(DECORATOR, Outcome::Cancelled);
                    return Err(reason);
                }
                _ = tokio::time::sleep(self.config.delay) => {}
            }

            attempt = attempt.saturating_add(1);
        }
    }
}
