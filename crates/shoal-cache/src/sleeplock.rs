//! Content locks: long-held exclusive locks over buffer payloads.
//!
//! A [`SleepLock`] is the second locking tier of the cache. Unlike the
//! shard metadata locks it may be held across device I/O, and a blocked
//! acquirer suspends on a condvar instead of spinning. Possession is
//! witnessed by a holder id rather than a guard so that a handle can carry
//! the lock across call boundaries; every payload access re-checks the
//! holder and reports a lock-discipline violation on mismatch.
//!
//! Waiting is sliced so a blocked acquirer can observe its cancellation
//! token: the condvar wait uses a bounded timeout and the token is polled
//! between slices. A cancelled waiter abandons the wait without having
//! touched the protected value.

use parking_lot::{Condvar, Mutex};
use shoal_error::{Result, ShoalError};
use shoal_types::cancel::CancelToken;
use std::time::Duration;

/// Token identifying the current lock holder. Allocated by the cache,
/// unique per acquisition.
pub(crate) type HolderId = u64;

/// Upper bound on one condvar wait slice; the cancellation token is polled
/// between slices.
const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct SleepInner<T> {
    holder: Option<HolderId>,
    value: T,
}

/// Exclusive sleep lock over `T`, identified-holder variant.
#[derive(Debug)]
pub(crate) struct SleepLock<T> {
    inner: Mutex<SleepInner<T>>,
    cond: Condvar,
}

impl<T> SleepLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(SleepInner {
                holder: None,
                value,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until the lock is free, then take it as `holder`. Returns
    /// `Cancelled` if the token fires while waiting.
    pub(crate) fn acquire(&self, cx: &CancelToken, holder: HolderId) -> Result<()> {
        cx.checkpoint().map_err(|_| ShoalError::Cancelled)?;
        let mut inner = self.inner.lock();
        loop {
            if inner.holder.is_none() {
                inner.holder = Some(holder);
                return Ok(());
            }
            let _ = self.cond.wait_for(&mut inner, WAIT_SLICE);
            if cx.is_cancelled() {
                return Err(ShoalError::Cancelled);
            }
        }
    }

    /// Take the lock if it is free, without blocking.
    pub(crate) fn try_acquire(&self, holder: HolderId) -> bool {
        let mut inner = self.inner.lock();
        if inner.holder.is_none() {
            inner.holder = Some(holder);
            true
        } else {
            false
        }
    }

    /// Release the lock and wake one waiter. `holder` must be the current
    /// holder, else this is a lock-discipline violation.
    pub(crate) fn release(&self, holder: HolderId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.holder != Some(holder) {
            return Err(ShoalError::LockDiscipline(
                "release by a caller that does not hold the content lock".to_owned(),
            ));
        }
        inner.holder = None;
        drop(inner);
        self.cond.notify_one();
        Ok(())
    }

    /// Read access to the protected value; `holder` must hold the lock.
    pub(crate) fn with<R>(&self, holder: HolderId, f: impl FnOnce(&T) -> R) -> Result<R> {
        let inner = self.inner.lock();
        if inner.holder != Some(holder) {
            return Err(ShoalError::LockDiscipline(
                "payload access by a caller that does not hold the content lock".to_owned(),
            ));
        }
        Ok(f(&inner.value))
    }

    /// Write access to the protected value; `holder` must hold the lock.
    pub(crate) fn with_mut<R>(&self, holder: HolderId, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut inner = self.inner.lock();
        if inner.holder != Some(holder) {
            return Err(ShoalError::LockDiscipline(
                "payload access by a caller that does not hold the content lock".to_owned(),
            ));
        }
        Ok(f(&mut inner.value))
    }

    #[cfg(test)]
    pub(crate) fn holder(&self) -> Option<HolderId> {
        self.inner.lock().holder
    }
}
