//! Timeout decorator
//!
//! Wraps a [`SlowOperation`], which blocks and cannot observe cancellation.
//! Each call runs the operation on the blocking pool and races its completion
//! against the caller's context. When the context wins, the call returns at
//! once; the abandoned run keeps going and its late result lands in a oneshot
//! slot nobody reads, so it never blocks.

use crate::context::CallContext;
use crate::error::{OperationResult, StabilityError};
use crate::metrics::{Outcome, try_record_outcome};
use crate::operation::{RemoteOperation, SlowOperation};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

const DECORATOR: &str = "timeout";

/// Decorator bounding a blocking operation by the caller's deadline
#[derive(Clone)]
pub struct Timeout {
    op: Arc<dyn SlowOperation>,
}

impl Timeout {
    pub fn new(op: Arc<dyn SlowOperation>) -> Self {
        Self { op }
    }

    /// Operation name
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    /// Run the operation with `input`, giving up when `ctx` is done
    pub async fn call(&self, ctx: &CallContext, input: &str) -> OperationResult {
        if let Some(err) = ctx.err() {
            try_record_outcome(DECORATOR, Outcome::Cancelled);
            return Err(err);
        }

        let (tx, rx) = oneshot::channel();
        let op = Arc::clone(&self.op);
        let input = input.to_owned();

        tokio::task::spawn_blocking(move || {
            // Receiver is gone if the caller gave up
            let _ = tx.send(op.run(&input));
        });

        tokio::select! {
            reason = ctx.done() => {
                debug!(operation = self.op.name(), error = %reason, "abandoning slow operation");
                try_record_outcome(DECORATOR, Outcome::Cancelled);
                Err(reason)
            }
            completed = rx => {
                let result = completed.unwrap_or_else(|_| {
                    Err(StabilityError::remote(format!(
                        "{} terminated without a result",
                        self.op.name()
                    )))
                });
                try_record_outcome(
                    DECORATOR,
                    if result.is_ok() { Outcome::Success } else { Outcome::Failure },
                );
                result
            }
        }
    }

    /// Fix the input, yielding a [`RemoteOperation`] that composes with the other decorators
    pub fn bind(&self, input: impl Into<String>) -> TimeoutCall {
        TimeoutCall {
            timeout: self.clone(),
            input: input.into(),
        }
    }
}

/// A [`Timeout`] bound to a fixed input
pub struct TimeoutCall {
    timeout: Timeout,
    input: String,
}

#[async_trait]
impl RemoteOperation for TimeoutCall {
    fn name(&self) -> &'static str {
        self.timeout.name()
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        self.timeout.call(ctx, &self.input).await
    }
}
