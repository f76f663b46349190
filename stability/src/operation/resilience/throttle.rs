//! Throttle decorator
//!
//! Token bucket that refills all at once: `max_calls` tokens per `interval`.
//! A background replenisher resets the bucket every interval. It is started by
//! the first call that finds the context live (an atomic latch makes sure only
//! one is ever started) and exits when that call's context is done or the
//! throttle is dropped.
//!
//! # Contention
//!
//! The token check and the wrapped call happen under the same async mutex, so
//! throttled calls run one at a time even when tokens are available. A slow
//! wrapped operation therefore also delays the replenisher and every other
//! caller.

use crate::context::CallContext;
use crate::error::{OperationResult, StabilityError};
use crate::metrics::{Outcome, try_record_outcome, try_task_started, try_task_stopped};
use crate::operation::RemoteOperation;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DECORATOR: &str = "throttle";

/// Shortest replenish interval accepted; tokio intervals cannot be zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Throttle configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Tokens available per interval
    pub max_calls: u32,
    /// Replenish period (minimum 1ms)
    pub interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            interval: Duration::from_secs(1),
        }
    }
}

/// Decorator bounding calls per interval
pub struct Throttle {
    inner: Arc<dyn RemoteOperation>,
    config: ThrottleConfig,
    /// Remaining tokens; also serializes the wrapped calls
    tokens: Arc<Mutex<u32>>,
    /// One-shot latch guarding the replenisher start
    started: AtomicBool,
    /// Replenisher currently alive
    replenishing: Arc<AtomicBool>,
    /// Cancelled on drop so the replenisher never outlives the throttle
    shutdown: CancellationToken,
}

impl Throttle {
    /// Wrap `inner`, allowing `max_calls` calls per `interval`
    pub fn new(inner: Arc<dyn RemoteOperation>, max_calls: u32, interval: Duration) -> Self {
        Self::with_config(
            inner,
            ThrottleConfig {
                max_calls,
                interval,
            },
        )
    }

    /// Wrap `inner` with a full configuration
    pub fn with_config(inner: Arc<dyn RemoteOperation>, mut config: ThrottleConfig) -> Self {
        config.interval = config.interval.max(MIN_INTERVAL);

        Self {
            inner,
            tokens: Arc::new(Mutex::new(config.max_calls)),
            config,
            started: AtomicBool::new(false),
            replenishing: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tokens left in the current interval
    ///
    /// Waits for any in-flight throttled call to finish.
    pub async fn tokens(&self) -> u32 {
        *self.tokens.lock().await
    }

    /// Whether the background replenisher is alive
    pub fn is_replenishing(&self) -> bool {
        self.replenishing.load(Ordering::Acquire)
    }

    /// Start the replenisher, governed by `ctx`
    fn spawn_replenisher(&self, ctx: CallContext) {
        let tokens = Arc::clone(&self.tokens);
        let replenishing = Arc::clone(&self.replenishing);
        let shutdown = self.shutdown.clone();
        let max_calls = self.config.max_calls;
        let interval = self.config.interval;
        let operation = self.inner.name();

        replenishing.store(true, Ordering::Release);
        try_task_started(DECORATOR);
        info!(operation, ?interval, max_calls, "throttle replenisher started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ctx.done() => break,
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        *tokens.lock().await = max_calls;
                    }
                }
            }

            replenishing.store(false, Ordering::Release);
            try_task_stopped(DECORATOR);
            info!(operation, "throttle replenisher stopped");
        });
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl RemoteOperation for Throttle {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        if let Some(err) = ctx.err() {
            try_record_outcome(DECORATOR, Outcome::Cancelled);
            return Err(err);
        }

        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.spawn_replenisher(ctx.clone());
        }

        let mut tokens = self.tokens.lock().await;

        if *tokens == 0 {
            debug!(operation = self.inner.name(), "throttled");
            try_record_outcome(DECORATOR, Outcome::Rejected);
            return Err(StabilityError::TooManyCalls);
        }

        *tokens -= 1;

        // Lock stays held for the wrapped call
        let result = self.inner.call(ctx).await;
        drop(tokens);

        try_record_outcome(
            DECORATOR,
            if result.is_ok() {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        );
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::operation::operation_fn;
    use std::sync::atomic::AtomicU32;

    fn counting(calls: Arc<AtomicU32>) -> Arc<dyn RemoteOperation> {
        Arc::new(operation_fn("counting", move |_ctx| {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(n.to_string())
            }
        }))
    }

    async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_rejects_after_max_calls() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Throttle::new(counting(calls.clone()), 3, Duration::from_secs(60));
        let ctx = CallContext::background();

        for expected in 1..=3 {
            assert_eq!(throttle.call(&ctx).await.unwrap(), expected.to_string());
        }
        assert_eq!(throttle.call(&ctx).await, Err(StabilityError::TooManyCalls));
        assert_eq!(throttle.call(&ctx).await, Err(StabilityError::TooManyCalls));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(throttle.tokens().await, 0);
        ctx.cancel();
    }

    #[tokio::test]
    async fn test_replenishes_after_interval() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Throttle::new(counting(calls.clone()), 2, Duration::from_millis(50));
        let ctx = CallContext::background();

        assert!(throttle.call(&ctx).await.is_ok());
        assert!(throttle.call(&ctx).await.is_ok());
        assert_eq!(throttle.call(&ctx).await, Err(StabilityError::TooManyCalls));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(throttle.tokens().await, 2);
        assert!(throttle.call(&ctx).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        ctx.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Throttle::new(counting(calls.clone()), 1, Duration::from_secs(60));
        let ctx = CallContext::background();
        ctx.cancel();

        assert_eq!(throttle.call(&ctx).await, Err(StabilityError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(throttle.tokens().await, 1);
        assert!(!throttle.is_replenishing());
    }

    #[tokio::test]
    async fn test_replenisher_stops_on_cancel() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Throttle::new(counting(calls), 5, Duration::from_millis(10));
        let ctx = CallContext::background();

        assert!(throttle.call(&ctx).await.is_ok());
        assert!(throttle.is_replenishing());

        ctx.cancel();
        assert!(wait_until(Duration::from_secs(1), || !throttle.is_replenishing()).await);
    }

    #[tokio::test]
    async fn test_replenisher_stops_on_drop() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Throttle::new(counting(calls), 5, Duration::from_millis(10));
        let ctx = CallContext::background();

        assert!(throttle.call(&ctx).await.is_ok());
        let replenishing = Arc::clone(&throttle.replenishing);
        drop(throttle);

        assert!(
            wait_until(Duration::from_secs(1), || !replenishing.load(Ordering::Acquire)).await
        );
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_wrapped_failure_consumes_token() {
        let op: Arc<dyn RemoteOperation> = Arc::new(operation_fn("failing", |_ctx| async {
            Err(StabilityError::remote("down"))
        }));
        let throttle = Throttle::new(op, 1, Duration::from_secs(60));
        let ctx = CallContext::background();

        assert_eq!(
            throttle.call(&ctx).await,
            Err(StabilityError::remote("down"))
        );
        assert_eq!(throttle.call(&ctx).await, Err(StabilityError::TooManyCalls));
        ctx.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_calls_are_serialized() {
        let op: Arc<dyn RemoteOperation> = Arc::new(operation_fn("slow", |_ctx| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("done".to_string())
        }));
        let throttle = Arc::new(Throttle::new(op, 5, Duration::from_secs(60)));
        let ctx = CallContext::background();

        let start = Instant::now();
        let a = {
            let throttle = Arc::clone(&throttle);
            let ctx = ctx.clone();
            tokio::spawn(async move { throttle.call(&ctx).await })
        };
        let b = {
            let throttle = Arc::clone(&throttle);
            let ctx = ctx.clone();
            tokio::spawn(async move { throttle.call(&ctx).await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert!(start.elapsed() >= Duration::from_millis(100));
        ctx.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let throttle = Arc::new(Throttle::new(
            counting(calls.clone()),
            5,
            Duration::from_secs(60),
        ));
        let ctx = CallContext::background();
        let mut handles = vec![];

        for _ in 0..20 {
            let throttle = Arc::clone(&throttle);
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { throttle.call(&ctx).await }));
        }

        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let passed = results.iter().filter(|r| r.is_ok()).count();
        let throttled = results
            .iter()
            .filter(|r| matches!(r, Err(StabilityError::TooManyCalls)))
            .count();

        assert_eq!(passed, 5);
        assert_eq!(throttled, 15);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        ctx.cancel();
    }
}
