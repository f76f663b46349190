//! Shared test doubles and task accounting for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use stability::{CallContext, OperationResult, RemoteOperation, StabilityError};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Test Operations
// ============================================================================

/// Operation that fails a configurable number of times then succeeds
pub struct FailNTimes {
    failures_remaining: AtomicU32,
    call_count: AtomicU64,
}

impl FailNTimes {
    pub fn new(fail_count: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(fail_count),
            call_count: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteOperation for FailNTimes {
    fn name(&self) -> &'static str {
        "fail_n_times"
    }

    async fn call(&self, _: &CallContext) -> OperationResult {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok();

        if failing {
            Err(StabilityError::remote("simulated failure"))
        } else {
            Ok(format!("call {n}"))
        }
    }
}

/// Operation that always fails
pub struct AlwaysFail {
    call_count: AtomicU64,
}

impl AlwaysFail {
    pub fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteOperation for AlwaysFail {
    fn name(&self) -> &'static str {
        "always_fail"
    }

    async fn call(&self, _: &CallContext) -> OperationResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Err(StabilityError::remote("always fails"))
    }
}

/// Operation that succeeds with its invocation number, optionally after a pause
pub struct Tracking {
    call_count: AtomicU64,
    latency: Duration,
}

impl Tracking {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            call_count: AtomicU64::new(0),
            latency,
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteOperation for Tracking {
    fn name(&self) -> &'static str {
        "tracking"
    }

    async fn call(&self, _: &CallContext) -> OperationResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(n.to_string())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Tasks currently alive on this test's runtime
pub fn alive_tasks() -> usize {
    tokio::runtime::Handle::current()
        .metrics()
        .num_alive_tasks()
}

/// Wait up to `timeout` for the live task count to drop to `baseline`
///
/// Returns the last observed count.
pub async fn settle_tasks(baseline: usize, timeout: Duration) -> usize {
    let deadline = Instant::now() + timeout;
    loop {
        let alive = alive_tasks();
        if alive <= baseline || Instant::now() >= deadline {
            return alive;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll `check` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
