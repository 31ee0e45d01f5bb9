#![forbid(unsafe_code)]
//! Error types for the shoal buffer cache.
//!
//! # Error taxonomy
//!
//! [`ShoalError`] is the single user-facing error type returned by the
//! cache and the device layer. The split between error and normal control
//! flow follows the cache's contract: a cache miss and a not-yet-loaded
//! payload are ordinary outcomes, never errors.
//!
//! | Variant | Class | Meaning |
//! |---------|-------|---------|
//! | `ResourceExhausted` | capacity | every buffer pool-wide is referenced; no eviction victim exists |
//! | `LockDiscipline` | programming error | a content-lock operation without holding the lock |
//! | `Cancelled` | cooperative | a blocked caller observed its cancellation token |
//! | `Io` | environment | the underlying device failed |
//! | `Format` | configuration | structurally invalid geometry or configuration |
//! | `PermissionDenied` | environment | write attempted on a read-only device |
//!
//! `ResourceExhausted` is fatal to the requesting path: the cache offers no
//! backpressure or queueing, so exhaustion must be prevented by capacity
//! planning or surfaced as a hard failure upstream. `LockDiscipline` is an
//! assertion-class failure — callers must treat it as a bug, never retry.
//!
//! # Design constraints
//!
//! This crate MUST NOT depend on `shoal-types` (no cyclic deps). Crate-local
//! errors (`shoal_types::cancel::Cancelled`, `shoal_types::InvalidField`)
//! convert into `ShoalError` at their consuming crates' boundaries. All
//! string payloads are owned to avoid lifetime entanglement across threads.

use thiserror::Error;

/// Unified error type for all shoal operations.
#[derive(Debug, Error)]
pub enum ShoalError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No unreferenced buffer exists anywhere in the pool; eviction cannot
    /// make progress. Unrecoverable at this layer.
    #[error("buffer pool exhausted: all {capacity} buffers are referenced")]
    ResourceExhausted { capacity: usize },

    /// A content-lock operation (`store`, `release`, payload access) was
    /// invoked by a caller that does not hold the buffer's content lock.
    /// Programming-error class: treat as a bug, never retry.
    #[error("lock discipline violation: {0}")]
    LockDiscipline(String),

    /// A blocked operation observed its cancellation token and abandoned
    /// the wait.
    #[error("operation cancelled")]
    Cancelled,

    /// Structurally invalid geometry or configuration (zero capacity,
    /// unaligned device length, unknown device id, size mismatch).
    #[error("invalid format: {0}")]
    Format(String),

    /// Write attempted on a device opened read-only.
    #[error("permission denied")]
    PermissionDenied,
}

/// Result alias using `ShoalError`.
pub type Result<T> = std::result::Result<T, ShoalError>;
