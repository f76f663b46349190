//! Cancellation-bearing call context
//!
//! Every remote operation receives a [`CallContext`]. It carries a
//! cancellation token and an optional deadline; derived contexts are
//! cancelled together with their parent and never outlive its deadline.
//!
//! ```text
//! background ──► with_timeout(500ms) ──► child()
//!     │                  │                  │
//!   cancel() ───────────►└─────────────────►┘   (propagates down, never up)
//! ```

use crate::error::StabilityError;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus optional deadline
///
/// Cheap to clone; clones observe the same cancellation.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Root context: never times out, cancelled only explicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a context that is cancelled when `self` is, but can be cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context that expires at `deadline` (or earlier, if the parent does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that expires `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and everything derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, or `None` while it is still live
    ///
    /// Explicit cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<StabilityError> {
        if self.token.is_cancelled() {
            return Some(StabilityError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StabilityError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Check if the context is done
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the context is done and return the reason
    ///
    /// Cancel safe: dropping the future has no side effects.
    pub async fn done(&self) -> StabilityError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => StabilityError::Cancelled,
                    _ = sleep_until(deadline) => StabilityError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                StabilityError::Cancelled
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}
