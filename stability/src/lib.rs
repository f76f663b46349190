//! stability - resilience decorators for remote operations
//!
//! Wraps effectful calls that can fail (RPCs, HTTP requests, queries) with
//! timeout, retry, throttle, debounce and circuit breaker behavior. Every
//! decorator takes a [`RemoteOperation`] and is one, so they nest freely.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Debounce ──► Throttle ──► CircuitBreaker ──► Retry ──► operation
//!              (ctx: cancellation + deadline flows through every layer)
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod operation;

pub use config::{Config, LogFormat};
pub use context::CallContext;
pub use error::{OperationResult, Result, StabilityError};
pub use operation::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, DebounceFirst, DebounceLast,
    ResilientOperation, Retry, RetryConfig, Throttle, ThrottleConfig, Timeout, TimeoutCall,
};
pub use operation::{
    FnOperation, RemoteOperation, SimulatedOperation, SlowFn, SlowOperation, operation_fn,
    slow_fn,
};
