//! Simulated remote operation
//!
//! Stand-in backend for the demo binary and the benches: answers after a fixed
//! latency and fails on a deterministic every-Nth-call pattern.

use crate::context::CallContext;
use crate::error::{OperationResult, StabilityError};
use crate::operation::RemoteOperation;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Deterministically flaky operation
pub struct SimulatedOperation {
    name: &'static str,
    latency: Duration,
    /// Every `fail_every`-th call fails; 0 never fails
    fail_every: u64,
    calls: AtomicU64,
}

impl SimulatedOperation {
    /// Create an operation that always succeeds immediately
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            latency: Duration::ZERO,
            fail_every: 0,
            calls: AtomicU64::new(0),
        }
    }

    /// Wait `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every `n`-th call (1 fails every call, 0 never fails)
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    /// Invocations so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemoteOperation for SimulatedOperation {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.latency.is_zero() {
            tokio::select! {
                reason = ctx.done() => return Err(reason),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }

        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(StabilityError::remote(format!(
                "{} call {n}: simulated outage",
                self.name
            )));
        }

        Ok(format!("{} call {n}", self.name))
    }
}
