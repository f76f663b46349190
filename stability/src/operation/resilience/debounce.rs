//! Debounce decorators
//!
//! Two flavors of call suppression within a time window:
//!
//! - [`DebounceFirst`]: the first call of a window reaches the wrapped
//!   operation; every other call in that window gets the cached result.
//! - [`DebounceLast`]: no call reaches the wrapped operation directly. Each
//!   call pushes the window forward and returns whatever is cached; once calls
//!   stop for a full window, a background task invokes the operation once and
//!   refreshes the cache.
//!
//! # DebounceLast timeline
//!
//! ```text
//! calls:   x  x   x              x x
//!          |<-------- window -->|
//! fire:                     *                 *
//!                  (window after the last x of each burst)
//! ```

use crate::context::CallContext;
use crate::error::OperationResult;
use crate::metrics::{Outcome, try_record_outcome, try_task_started, try_task_stopped};
use crate::operation::RemoteOperation;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DECORATOR_FIRST: &str = "debounce_first";
const DECORATOR_LAST: &str = "debounce_last";

fn outcome_of(result: &OperationResult) -> Outcome {
    if result.is_ok() {
        Outcome::Success
    } else {
        Outcome::Failure
    }
}

struct FirstState {
    cached: OperationResult,
    /// `None` until the first invocation completes
    threshold_call_at: Option<Instant>,
}

/// Decorator serving the first result of each window
///
/// The lock is held across the wrapped call, so at most one invocation is in
/// flight and concurrent callers of a fresh window wait for it and then share
/// its result.
pub struct DebounceFirst {
    inner: Arc<dyn RemoteOperation>,
    window: Duration,
    state: tokio::sync::Mutex<FirstState>,
}

impl DebounceFirst {
    /// Wrap `inner` with a debounce window
    pub fn new(inner: Arc<dyn RemoteOperation>, window: Duration) -> Self {
        Self {
            inner,
            window,
            state: tokio::sync::Mutex::new(FirstState {
                cached: Ok(String::new()),
                threshold_call_at: None,
            }),
        }
    }

    /// Get the window
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[async_trait]
impl RemoteOperation for DebounceFirst {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        let mut state = self.state.lock().await;

        if let Some(threshold) = state.threshold_call_at
            && Instant::now() < threshold
        {
            debug!(operation = self.inner.name(), "debounced, serving cached result");
            try_record_outcome(DECORATOR_FIRST, Outcome::Cached);
            return state.cached.clone();
        }

        let result = self.inner.call(ctx).await;
        state.cached = result.clone();
        state.threshold_call_at = Some(Instant::now() + self.window);

        try_record_outcome(DECORATOR_FIRST, outcome_of(&result));
        result
    }
}

struct LastState {
    cached: OperationResult,
    threshold_call_at: Instant,
    /// Bumped by every call; lets the flush task notice calls made while it ran
    generation: u64,
    /// Latch: a flush task is alive. Set by the call that spawns it, cleared by
    /// the task itself on exit.
    pending: bool,
}

/// Decorator deferring one call until the callers go quiet
pub struct DebounceLast {
    inner: Arc<dyn RemoteOperation>,
    window: Duration,
    state: Arc<parking_lot::Mutex<LastState>>,
    /// Cancelled on drop so a pending flush never outlives the decorator
    shutdown: CancellationToken,
}

impl DebounceLast {
    /// Wrap `inner` with a debounce window
    pub fn new(inner: Arc<dyn RemoteOperation>, window: Duration) -> Self {
        Self {
            inner,
            window,
            state: Arc::new(parking_lot::Mutex::new(LastState {
                cached: Ok(String::new()),
                threshold_call_at: Instant::now(),
                generation: 0,
                pending: false,
            })),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a deferred invocation is scheduled
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Result currently served to callers
    pub fn cached(&self) -> OperationResult {
        self.state.lock().cached.clone()
    }

    /// Spawn the flush task for a new burst, governed by `ctx`
    fn spawn_flush(&self, ctx: CallContext) {
        let inner = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        let operation = inner.name();

        try_task_started(DECORATOR_LAST);
        debug!(operation, "debounce flush scheduled");

        tokio::spawn(async move {
            flush(inner, state, ctx, shutdown).await;
            try_task_stopped(DECORATOR_LAST);
        });
    }
}

/// Wait for quiescence, then invoke once per burst
///
/// Exits with the latch released when no call arrived during the last
/// invocation, when `ctx` is done (caching the cancellation), or on shutdown.
async fn flush(
    inner: Arc<dyn RemoteOperation>,
    state: Arc<parking_lot::Mutex<LastState>>,
    ctx: CallContext,
    shutdown: CancellationToken,
) {
    let operation = inner.name();

    loop {
        let (threshold, generation) = {
            let s = state.lock();
            (s.threshold_call_at, s.generation)
        };

        if Instant::now() < threshold {
            tokio::select! {
                reason = ctx.done() => {
                    info!(operation, error = %reason, "debounce flush cancelled");
                    let mut s = state.lock();
                    s.cached = Err(reason);
                    s.pending = false;
                    return;
                }
                _ = shutdown.cancelled() => {
                    state.lock().pending = false;
                    return;
                }
                _ = sleep_until(threshold) => {}
            }
            continue;
        }

        let result = inner.call(&ctx).await;
        try_record_outcome(DECORATOR_LAST, outcome_of(&result));

        let done = {
            let mut s = state.lock();
            s.cached = result;
            if s.generation == generation {
                s.pending = false;
                true
            } else {
                false
            }
        };

        if done {
            debug!(operation, "debounce flush complete");
            return;
        }
        // Calls arrived while the operation ran: serve that burst too
    }
}

impl Drop for DebounceLast {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl RemoteOperation for DebounceLast {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        let (spawn, cached) = {
            let mut state = self.state.lock();
            state.threshold_call_at = Instant::now() + self.window;
            state.generation = state.generation.wrapping_add(1);

            let spawn = !state.pending;
            state.pending = true;
            (spawn, state.cached.clone())
        };

        if spawn {
            self.spawn_flush(ctx.clone());
        }

        try_record_outcome(DECORATOR_LAST, Outcome::Cached);
        cached
    }
}
