#![forbid(unsafe_code)]
//! Typed identifiers shared across the shoal workspace.
//!
//! Every crate in the workspace speaks in these newtypes rather than raw
//! integers: a `(DeviceId, BlockNumber)` pair is the identity of a cached
//! block, `BlockSize` is validated at construction, and `Tick` is the
//! logical clock used for LRU ranking. This crate is a leaf: it depends on
//! nothing else in the workspace, so the error crate and the device layer
//! can both use it without cycles.

pub mod cancel;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifies one block device behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Block number on a device (device-relative, zero-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

/// The full identity of a cached block: which device, which block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId {
    pub device: DeviceId,
    pub block: BlockNumber,
}

impl BlockId {
    #[must_use]
    pub fn new(device: DeviceId, block: BlockNumber) -> Self {
        Self { device, block }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}:blk{}", self.device.0, self.block.0)
    }
}

/// Logical time stamped on a buffer when its reference count returns to
/// zero. Larger means more recently idle; `Tick::ZERO` marks a buffer that
/// has never been used and is therefore the preferred eviction victim.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Self = Self(0);
}

/// A structurally invalid field value caught at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct InvalidField {
    pub field: &'static str,
    pub reason: &'static str,
}

/// Validated block size (power of two in 512..=65536).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    /// Create a `BlockSize` if `value` is a power of two in [512, 65536].
    pub fn new(value: u32) -> Result<Self, InvalidField> {
        if !value.is_power_of_two() || !(512..=65536).contains(&value) {
            return Err(InvalidField {
                field: "block_size",
                reason: "must be a power of two in 512..=65536",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Byte count as `usize` (always fits: max is 65536).
    #[must_use]
    pub fn bytes(self) -> usize {
        self.0 as usize
    }

    /// Convert a block number to a byte offset on its device.
    #[must_use]
    pub fn block_to_byte(self, block: BlockNumber) -> Option<u64> {
        block.0.checked_mul(u64::from(self.0))
    }
}
