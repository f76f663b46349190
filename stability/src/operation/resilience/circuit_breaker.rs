//! Circuit breaker decorator
//!
//! Counts consecutive failures of the wrapped operation. Once the count
//! reaches the threshold the circuit is open: calls fail fast with
//! [`StabilityError::ServiceUnavailable`] until a cool-down measured from the
//! last attempt has passed. The cool-down doubles with every failure past the
//! threshold.
//!
//! # State Transitions
//! ```text
//! Closed → Open:    failures >= threshold
//! Open → (probe):   last_attempt + base << (failures - threshold) has passed
//! probe fails:      failures += 1, cool-down doubles
//! any success:      failures = 0 (Closed)
//! ```
//!
//! There is no explicit half-open state and no single-probe guarantee: the
//! fast-fail check and the call are not one atomic step, so concurrent callers
//! arriving right as the cool-down ends may all reach the wrapped operation.
//! The breaker bounds sustained load, not every concurrent attempt.

use crate::context::CallContext;
use crate::error::{OperationResult, StabilityError};
use crate::metrics::{Outcome, try_record_outcome};
use crate::operation::RemoteOperation;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DECORATOR: &str = "circuit_breaker";

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens (minimum 1)
    pub failure_threshold: u32,
    /// Cool-down at the threshold; doubles for every failure beyond it
    pub base_cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_cool_down: Duration::from_secs(2),
        }
    }
}

/// Circuit state as seen by the next caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls reach the wrapped operation
    Closed,
    /// Calls fail fast until the cool-down passes
    Open,
}

struct BreakerState {
    failures: u32,
    last_attempt_at: Instant,
}

/// Decorator that stops calling a failing operation for an exponential cool-down
pub struct CircuitBreaker {
    inner: Arc<dyn RemoteOperation>,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Wrap `inner`, opening after `failure_threshold` consecutive failures
    pub fn new(inner: Arc<dyn RemoteOperation>, failure_threshold: u32) -> Self {
        Self::with_config(
            inner,
            CircuitBreakerConfig {
                failure_threshold,
                ..Default::default()
            },
        )
    }

    /// Wrap `inner` with a full configuration
    pub fn with_config(inner: Arc<dyn RemoteOperation>, mut config: CircuitBreakerConfig) -> Self {
        config.failure_threshold = config.failure_threshold.max(1);

        Self {
            inner,
            config,
            state: RwLock::new(BreakerState {
                failures: 0,
                last_attempt_at: Instant::now(),
            }),
        }
    }

    /// Consecutive failures observed so far
    pub fn failure_count(&self) -> u32 {
        self.state.read().failures
    }

    /// Whether the next call would fail fast
    pub fn state(&self) -> CircuitState {
        let state = self.state.read();
        match self.retry_at(&state) {
            Some(retry_at) if retry_at > Instant::now() => CircuitState::Open,
            _ => CircuitState::Closed,
        }
    }

    /// Earliest instant the wrapped operation may be called again
    ///
    /// `None` while below the threshold. An unrepresentable instant saturates
    /// to one year out.
    fn retry_at(&self, state: &BreakerState) -> Option<Instant> {
        let excess = state.failures.checked_sub(self.config.failure_threshold)?;
        let cool_down = cool_down_for(self.config.base_cool_down, excess);

        Some(
            state
                .last_attempt_at
                .checked_add(cool_down)
                .unwrap_or_else(|| state.last_attempt_at + Duration::from_secs(365 * 24 * 3600)),
        )
    }
}

/// `base << excess`, saturating
fn cool_down_for(base: Duration, excess: u32) -> Duration {
    let factor = 1u32.checked_shl(excess).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[async_trait]
impl RemoteOperation for CircuitBreaker {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        {
            let state = self.state.read();
            if let Some(retry_at) = self.retry_at(&state)
                && retry_at > Instant::now()
            {
                debug!(
                    operation = self.inner.name(),
                    failures = state.failures,
                    "circuit open, failing fast"
                );
                try_record_outcome(DECORATOR, Outcome::Rejected);
                return Err(StabilityError::ServiceUnavailable);
            }
        }

        let result = self.inner.call(ctx).await;

        let mut state = self.state.write();
        state.last_attempt_at = Instant::now();

        match &result {
            Ok(_) => {
                if state.failures >= self.config.failure_threshold {
                    info!(
                        operation = self.inner.name(),
                        failures = state.failures,
                        "circuit closed"
                    );
                }
                state.failures = 0;
                try_record_outcome(DECORATOR, Outcome::Success);
            }
            Err(e) => {
                state.failures = state.failures.saturating_add(1);
                if let Some(excess) = state.failures.checked_sub(self.config.failure_threshold) {
                    warn!(
                        operation = self.inner.name(),
                        failures = state.failures,
                        cool_down = ?cool_down_for(self.config.base_cool_down, excess),
                        error = %e,
                        "circuit open"
                    );
                }
                try_record_outcome(DECORATOR, Outcome::Failure);
            }
        }

        result
    }
}
