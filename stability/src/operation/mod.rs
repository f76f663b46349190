//! Remote operation abstraction
//!
//! A remote operation is any effectful call that can fail: an RPC, an HTTP
//! request, a database query. Resilience decorators in [`resilience`] take an
//! operation and return another operation of the same shape, so they nest in
//! whatever order the caller chooses.
//!
//! # Example
//!
//! ```ignore
//! struct InventoryLookup {
//!     client: InventoryClient,
//! }
//!
//! #[async_trait]
//! impl RemoteOperation for InventoryLookup {
//!     fn name(&self) -> &'static str { "inventory" }
//!
//!     async fn call(&self, ctx: &CallContext) -> OperationResult {
//!         self.client
//!             .lookup()
//!             .await
//!             .map_err(|e| StabilityError::remote(e.to_string()))
//!     }
//! }
//! ```

pub mod resilience;
pub mod simulated;

use crate::context::CallContext;
use crate::error::OperationResult;
use async_trait::async_trait;
use std::future::Future;

pub use simulated::SimulatedOperation;

/// RemoteOperation trait - the unit every decorator wraps and returns
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    /// Operation name for identification and logging
    fn name(&self) -> &'static str;

    /// Invoke the operation
    ///
    /// # Arguments
    /// * `ctx` - Cancellation signal and deadline governing this call
    ///
    /// # Returns
    /// The success string, or the failure that replaced it
    async fn call(&self, ctx: &CallContext) -> OperationResult;
}

/// A blocking operation that cannot observe cancellation
///
/// Only [`resilience::Timeout`] consumes this shape; it runs the operation on
/// the blocking pool and races it against the caller's context.
pub trait SlowOperation: Send + Sync + 'static {
    /// Operation name for identification and logging
    fn name(&self) -> &'static str;

    /// Run to completion, however long that takes
    fn run(&self, input: &str) -> OperationResult;
}

/// RemoteOperation backed by an async closure
pub struct FnOperation<F> {
    name: &'static str,
    f: F,
}

/// Wrap an async closure as a [`RemoteOperation`]
///
/// The closure receives an owned clone of the call context so it can move it
/// into the returned future.
pub fn operation_fn<F, Fut>(name: &'static str, f: F) -> FnOperation<F>
where
    F: Fn(CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = OperationResult> + Send,
{
    FnOperation { name, f }
}

#[async_trait]
impl<F, Fut> RemoteOperation for FnOperation<F>
where
    F: Fn(CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = OperationResult> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    async fn call(&self, ctx: &CallContext) -> OperationResult {
        (self.f)(ctx.clone()).await
    }
}

/// SlowOperation backed by a blocking closure
pub struct SlowFn<F> {
    name: &'static str,
    f: F,
}

/// Wrap a blocking closure as a [`SlowOperation`]
pub fn slow_fn<F>(name: &'static str, f: F) -> SlowFn<F>
where
    F: Fn(&str) -> OperationResult + Send + Sync + 'static,
{
    SlowFn { name, f }
}

impl<F> SlowOperation for SlowFn<F>
where
    F: Fn(&str) -> OperationResult + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, input: &str) -> OperationResult {
        (self.f)(input)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::StabilityError;

    #[tokio::test]
    async fn test_operation_fn_passes_context() {
        let op = operation_fn("ctx-aware", |ctx: CallContext| async move {
            match ctx.err() {
                Some(err) => Err(err),
                None => Ok("live".to_string()),
            }
        });

        let ctx = CallContext::background();
        assert_eq!(op.name(), "ctx-aware");
        assert_eq!(op.call(&ctx).await.unwrap(), "live");

        ctx.cancel();
        assert_eq!(op.call(&ctx).await, Err(StabilityError::Cancelled));
    }

    #[test]
    fn test_slow_fn_runs_closure() {
        let op = slow_fn("echo", |input: &str| Ok(input.to_uppercase()));
        assert_eq!(op.name(), "echo");
        assert_eq!(op.run("abc").unwrap(), "ABC");
    }
}
