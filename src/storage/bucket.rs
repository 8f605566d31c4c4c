//! Hash-bucketed record packing.
//!
//! Storing one durable key per record would create an unbounded number of
//! physical keys. Instead, records are packed into a bounded set of buckets:
//! the first byte of a stable hash of the record ID selects one of 256
//! buckets, and the whole bucket is rewritten on every change to any record
//! in it. The bucket key is stored on the record itself so that updates and
//! deletes find the same bucket for the record's whole life.

use std::io::Cursor;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{codec, StorageBackend, StorageError};
use crate::locks::LockTable;

/// Prefix under which entity buckets are stored.
pub const ENTITY_PACKER_PREFIX: &str = "packer/buckets/";

/// Prefix under which group buckets are stored.
pub const GROUP_PACKER_PREFIX: &str = "packer/group/buckets/";

/// Bucket key for a record ID: two lowercase hex characters.
///
/// Stable across releases; changing this orphans every stored record.
#[must_use]
pub fn bucket_key_for_id(id: &str) -> String {
    format!("{:02x}", blake3::hash(id.as_bytes()).as_bytes()[0])
}

/// One packed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketItem<T> {
    /// Record ID, unique within the bucket.
    pub id: String,
    /// The record itself.
    pub data: T,
}

/// One durable bucket: every record whose ID hashes to its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket<T> {
    /// The two-hex-character bucket key.
    pub key: String,
    /// Packed records, in insertion order.
    #[serde(default = "Vec::new")]
    pub items: Vec<BucketItem<T>>,
}

impl<T> Bucket<T> {
    fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            items: Vec::new(),
        }
    }

    /// Inserts or replaces the item with the given ID.
    fn upsert(&mut self, id: &str, data: T) {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => item.data = data,
            None => self.items.push(BucketItem {
                id: id.to_string(),
                data,
            }),
        }
    }

    /// Removes the item with the given ID. Returns whether it was present.
    fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }
}

/// A typed packer over one storage prefix.
///
/// Bucket rewrites are read-modify-write; a per-bucket lock serializes
/// writers of the same bucket. Readers go straight to storage, relying on
/// the backend's whole-value atomicity.
pub struct BucketStore<T> {
    storage: Arc<dyn StorageBackend>,
    prefix: String,
    locks: LockTable,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BucketStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Creates a packer writing buckets under `prefix`.
    pub fn new(storage: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            locks: LockTable::new(),
            _marker: PhantomData,
        }
    }

    /// The storage prefix of this packer.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn storage_key(&self, bucket_key: &str) -> String {
        format!("{}{bucket_key}", self.prefix)
    }

    /// Reads a whole bucket. `Ok(None)` when the bucket does not exist.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; a bucket that fails its integrity check
    /// surfaces as [`StorageError::Corruption`].
    pub fn get_bucket(&self, bucket_key: &str) -> Result<Option<Bucket<T>>, StorageError> {
        let Some(bytes) = self.storage.get(&self.storage_key(bucket_key))? else {
            return Ok(None);
        };
        let bucket = codec::decode(&mut Cursor::new(bytes))?;
        Ok(Some(bucket))
    }

    /// Reads one item out of the bucket it is filed under.
    ///
    /// # Errors
    ///
    /// Propagates backend and decode failures.
    pub fn get_item(&self, bucket_key: &str, id: &str) -> Result<Option<T>, StorageError> {
        let Some(bucket) = self.get_bucket(bucket_key)? else {
            return Ok(None);
        };
        Ok(bucket
            .items
            .into_iter()
            .find(|item| item.id == id)
            .map(|item| item.data))
    }

    /// Inserts or replaces one record in its bucket.
    ///
    /// # Errors
    ///
    /// Propagates backend and encode failures.
    pub fn put_item(&self, bucket_key: &str, id: &str, data: &T) -> Result<(), StorageError> {
        let key = self.storage_key(bucket_key);
        let _guard = self.locks.lock_for(key.as_bytes());

        let mut bucket = self
            .read_locked(&key)?
            .unwrap_or_else(|| Bucket::new(bucket_key));
        bucket.upsert(id, data.clone());
        self.write_locked(&key, &bucket)
    }

    /// Removes one record from its bucket. Removing an absent record is not
    /// an error. A bucket left empty is deleted from storage.
    ///
    /// # Errors
    ///
    /// Propagates backend and codec failures.
    pub fn delete_item(&self, bucket_key: &str, id: &str) -> Result<(), StorageError> {
        self.delete_items(bucket_key, std::iter::once(id))
    }

    /// Removes several records from one bucket in a single rewrite.
    ///
    /// # Errors
    ///
    /// Propagates backend and codec failures.
    pub fn delete_items<'a>(
        &self,
        bucket_key: &str,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), StorageError> {
        let key = self.storage_key(bucket_key);
        let _guard = self.locks.lock_for(key.as_bytes());

        let Some(mut bucket) = self.read_locked(&key)? else {
            return Ok(());
        };

        let mut changed = false;
        for id in ids {
            changed |= bucket.remove(id);
        }
        if !changed {
            return Ok(());
        }

        if bucket.items.is_empty() {
            self.storage.delete(&key)
        } else {
            self.write_locked(&key, &bucket)
        }
    }

    /// Lists the bucket keys that currently exist under this prefix.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub fn list_bucket_keys(&self) -> Result<Vec<String>, StorageError> {
        let children = self.storage.list(&self.prefix)?;
        Ok(children
            .into_iter()
            .filter(|child| !child.ends_with('/'))
            .collect())
    }

    fn read_locked(&self, storage_key: &str) -> Result<Option<Bucket<T>>, StorageError> {
        let Some(bytes) = self.storage.get(storage_key)? else {
            return Ok(None);
        };
        Ok(Some(codec::decode(&mut Cursor::new(bytes))?))
    }

    fn write_locked(&self, storage_key: &str, bucket: &Bucket<T>) -> Result<(), StorageError> {
        let bytes = codec::encode(bucket)?;
        self.storage.put(storage_key, &bytes)
    }
}

impl<T> std::fmt::Debug for BucketStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
