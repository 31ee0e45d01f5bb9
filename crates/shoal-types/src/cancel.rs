//! Cooperative cancellation.
//!
//! A [`CancelToken`] is cloned into every caller that may block inside the
//! cache or the device layer. Blocking operations poll the token at
//! checkpoints and while waiting on a content lock; a cancelled caller
//! abandons the wait and surfaces [`Cancelled`] instead of completing.
//! Cancellation is observed, never injected: no operation is torn down
//! mid-flight, and a token that is never cancelled costs one relaxed atomic
//! load per checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// The operation observed its cancellation token and abandoned the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared cancellation flag. Cloning is cheap; all clones observe the same
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; wakes nobody by itself — blocked
    /// callers notice on their next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail fast if cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
