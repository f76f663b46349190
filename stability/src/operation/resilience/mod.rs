//! Resilience decorators for remote operations
//!
//! Each decorator wraps an `Arc<dyn RemoteOperation>` and is itself a
//! `RemoteOperation`:
//! - **Retry**: repeat a failing call up to a bound, fixed delay in between
//! - **CircuitBreaker**: fail fast after consecutive failures, exponential cool-down
//! - **Throttle**: at most N calls per interval
//! - **DebounceFirst**: first call of a window wins, the rest get its result
//! - **DebounceLast**: one deferred call once callers go quiet
//! - **Timeout**: bound a blocking operation by the caller's deadline
//!
//! # Example
//!
//! ```ignore
//! use stability::operation::resilience::*;
//!
//! let resilient = ResilientOperation::wrap(inventory)
//!     .with_default_retry()
//!     .with_circuit_breaker(CircuitBreakerConfig::default())
//!     .with_throttle(ThrottleConfig::default())
//!     .build();
//!
//! let ctx = CallContext::background().with_timeout(Duration::from_millis(500));
//! let stock = resilient.call(&ctx).await?;
//! ```

mod circuit_breaker;
mod config;
mod debounce;
mod retry;
mod throttle;
mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::ResilientOperation;
pub use debounce::{DebounceFirst, DebounceLast};
pub use retry::{Retry, RetryConfig};
pub use throttle::{Throttle, ThrottleConfig};
pub use timeout::{Timeout, TimeoutCall};
