//! Sharded key locks.
//!
//! Mutations of a specific record are serialized by hashing the record's ID
//! onto one of a fixed set of mutexes. Unrelated records contend only when
//! their IDs land on the same shard. Multi-key acquisition sorts and
//! deduplicates shard indices first, so two callers locking overlapping key
//! sets cannot deadlock.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of lock shards. One byte of the key hash selects the shard.
pub(crate) const LOCK_SHARDS: usize = 256;

/// A fixed array of mutexes indexed by key hash.
pub(crate) struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Shard index for a key.
    pub(crate) fn shard_for(key: &[u8]) -> usize {
        blake3::hash(key).as_bytes()[0] as usize
    }

    /// Locks the shard owning `key`.
    pub(crate) fn lock_for(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.shards[Self::shard_for(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the shards owning every key in `keys`, in ascending shard
    /// order. Keys mapping to the same shard are locked once.
    pub(crate) fn lock_many<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a [u8]>,
    ) -> Vec<MutexGuard<'_, ()>> {
        let mut indices: Vec<usize> = keys.into_iter().map(|k| Self::shard_for(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .map(|i| self.shards[i].lock().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("shards", &self.shards.len())
            .finish()
    }
}
