//! Bucket table: sharded ownership of the buffer pool.
//!
//! Every pool slot is owned, at any instant, by exactly one shard's chain
//! (or by the thread performing an eviction move, while the slot is
//! unlinked). A shard's mutex guards its chain structure and the identity,
//! reference-count and idle-tick fields of every entry in it; those fields
//! are never touched without the owning shard's lock.
//!
//! Multi-shard lock acquisition follows one rule: shard locks are taken in
//! increasing index order, never out of order, and at most two are held at
//! once. That total order makes the cross-shard eviction scan trivially
//! deadlock-free. (The ancestry here is the ring-distance predicate some
//! caches use — "may lock shard r from shard c only if the forward cyclic
//! distance exceeds half the shard count"; the fixed total order admits
//! the same concurrency for this workload and is far easier to audit.)

use parking_lot::{Mutex, MutexGuard};
use shoal_types::{BlockId, BlockNumber, Tick};

/// Chain entry: metadata for one pool slot.
///
/// `ident == None` marks a free slot (startup state, or parked after
/// losing an insert race). Free slots keep `Tick::ZERO` so the LRU scan
/// prefers them over any slot that has actually been used.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) slot: u32,
    pub(crate) ident: Option<BlockId>,
    pub(crate) refcount: u32,
    pub(crate) idle_tick: Tick,
}

impl Entry {
    pub(crate) fn free(slot: u32) -> Self {
        Self {
            slot,
            ident: None,
            refcount: 0,
            idle_tick: Tick::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shard {
    pub(crate) entries: Vec<Entry>,
}

impl Shard {
    /// Linear scan of the chain for an identity. O(chain length).
    pub(crate) fn find(&mut self, ident: BlockId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.ident == Some(ident))
    }
}

#[derive(Debug)]
pub(crate) struct ShardTable {
    shards: Vec<Mutex<Shard>>,
}

impl ShardTable {
    /// Build the table and park all `capacity` slots, free, in shard 0.
    pub(crate) fn new(shard_count: usize, capacity: usize) -> Self {
        let mut shards: Vec<Mutex<Shard>> =
            (0..shard_count).map(|_| Mutex::new(Shard::default())).collect();
        let shard0 = shards[0].get_mut();
        for slot in 0..capacity {
            shard0
                .entries
                .push(Entry::free(u32::try_from(slot).expect("slot fits u32")));
        }
        Self { shards }
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index for a block: `blockNumber mod shard_count`.
    pub(crate) fn shard_index(&self, block: BlockNumber) -> usize {
        let count = u64::try_from(self.shards.len()).expect("shard count fits u64");
        usize::try_from(block.0 % count).expect("remainder fits usize")
    }

    /// Lock the shard owning `block`'s identity.
    pub(crate) fn lock_shard_for(&self, block: BlockNumber) -> MutexGuard<'_, Shard> {
        self.shards[self.shard_index(block)].lock()
    }

    /// Number of entries pool-wide that carry an identity. Shards are
    /// locked one at a time, in increasing index order.
    pub(crate) fn resident_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .entries
                    .iter()
                    .filter(|e| e.ident.is_some())
                    .count()
            })
            .sum()
    }

    /// Cross-shard LRU scan: unlink and return the unreferenced entry with
    /// the smallest idle tick pool-wide, or `None` if every entry is
    /// referenced.
    ///
    /// Locks are taken in increasing shard-index order. At most two shard
    /// locks are held at any instant: the scan cursor plus the shard of
    /// the current best candidate; the superseded candidate's lock is
    /// released eagerly whenever a smaller idle tick is found. The winner
    /// is unlinked while its (donor) shard lock is still held, so no other
    /// thread can observe a half-moved slot.
    pub(crate) fn take_lru_victim(&self) -> Option<Entry> {
        let mut best: Option<(MutexGuard<'_, Shard>, usize, Tick)> = None;
        for idx in 0..self.shards.len() {
            let guard = self.shards[idx].lock();
            let mut local: Option<(usize, Tick)> = None;
            for (pos, entry) in guard.entries.iter().enumerate() {
                if entry.refcount == 0
                    && local.map_or(true, |(_, tick)| entry.idle_tick < tick)
                {
                    local = Some((pos, entry.idle_tick));
                }
            }
            match local {
                Some((pos, tick))
                    if best.as_ref().map_or(true, |(_, _, best_tick)| tick < *best_tick) =>
                {
                    // Replacing `best` drops the superseded shard's guard.
                    best = Some((guard, pos, tick));
                }
                _ => {}
            }
        }
        best.map(|(mut guard, pos, _)| guard.entries.swap_remove(pos))
    }
}
