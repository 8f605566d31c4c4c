//! Durable storage abstraction and backends.
//!
//! The store persists through an opaque key/value barrier: byte values under
//! slash-separated string keys. Everything identity-specific sits above this
//! in [`bucket`], which packs many records into few keys. Two backends are
//! provided: an in-memory map for embedded use and tests, and a
//! one-file-per-key directory tree.

pub mod bucket;
pub mod codec;
pub mod file;

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored data failed an integrity check.
    #[error("Corrupt storage entry: {0}")]
    Corruption(String),

    /// Key is not usable by the backend.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// The durable key/value barrier.
///
/// Keys are slash-separated paths, e.g. `packer/buckets/1f`. Values are
/// opaque bytes. Implementations must be safe for concurrent use; callers
/// serialize writes to any single key themselves.
pub trait StorageBackend: Send + Sync {
    /// Reads the value at `key`. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes `value` at `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Deletes the value at `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Lists the immediate children of `prefix`, with the prefix stripped.
    ///
    /// A child that is itself a sub-tree is reported once with a trailing
    /// `/`. Results are sorted and deduplicated.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Reduces full keys under `prefix` to their sorted immediate children.
pub(crate) fn children_of<'a>(prefix: &str, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = keys
        .filter_map(|key| {
            let rest = key.strip_prefix(prefix)?;
            if rest.is_empty() {
                return None;
            }
            Some(match rest.find('/') {
                Some(idx) => rest[..=idx].to_string(),
                None => rest.to_string(),
            })
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Thread-safe in-memory storage backend.
#[derive(Debug, Default)]
pub struct InMemStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemStorage {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error when the internal lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("mem.len"))?;
        Ok(entries.len())
    }

    /// Returns true if no keys are stored.
    ///
    /// # Errors
    ///
    /// Returns an error when the internal lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl StorageBackend for InMemStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("mem.get"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("mem.put"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| lock_err("mem.delete"))?;
        entries.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| lock_err("mem.list"))?;
        let keys = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.as_str());
        Ok(children_of(prefix, keys))
    }
}
