//! Indexed transactional in-memory store.
//!
//! Holds the live image of all entities, aliases, and groups with secondary
//! indexes for every lookup the store needs. Readers take snapshots and are
//! never blocked; writers are serialized by a writer lock and publish
//! atomically on commit. Durability is out of scope here — callers persist
//! through the bucket store and treat this image as a rebuildable cache.

mod tables;
mod txn;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub(crate) use self::tables::DbState;
pub(crate) use self::txn::{ReadTxn, WriteTxn};

/// The in-memory database: a snapshot pointer plus a writer lock.
#[derive(Debug)]
pub(crate) struct IndexedDb {
    state: RwLock<Arc<DbState>>,
    writer: Mutex<()>,
}

impl IndexedDb {
    /// Creates an empty database.
    ///
    /// `case_sensitive` selects how name and alias-factor keys are matched;
    /// it is fixed for the life of the state and changed only via [`reset`].
    ///
    /// [`reset`]: IndexedDb::reset
    pub(crate) fn new(case_sensitive: bool) -> Self {
        Self {
            state: RwLock::new(Arc::new(DbState::new(case_sensitive))),
            writer: Mutex::new(()),
        }
    }

    /// Opens a read transaction on the current snapshot.
    pub(crate) fn begin_read(&self) -> ReadTxn {
        ReadTxn::new(self.snapshot())
    }

    /// Opens the write transaction. Blocks while another write transaction
    /// is open.
    pub(crate) fn begin_write(&self) -> WriteTxn<'_> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // Snapshot after taking the writer lock, so the copy starts from the
        // latest committed state.
        let state = (*self.snapshot()).clone();
        WriteTxn::new(self, state, guard)
    }

    /// Replaces the entire database with an empty one.
    ///
    /// Used when the store falls back from case-insensitive to
    /// case-sensitive matching and reloads from durable storage.
    pub(crate) fn reset(&self, case_sensitive: bool) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(DbState::new(case_sensitive));
    }

    /// Whether name matching is currently case-sensitive.
    pub(crate) fn case_sensitive(&self) -> bool {
        self.snapshot().case_sensitive()
    }

    fn snapshot(&self) -> Arc<DbState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::namespace::NamespaceId;

    #[test]
    fn test_reset_clears_and_switches_mode() {
        let db = IndexedDb::new(false);
        assert!(!db.case_sensitive());

        let entity = Entity::new("alice", NamespaceId::root());
        let id = entity.id;
        let mut txn = db.begin_write();
        txn.insert_entity(Arc::new(entity));
        txn.commit();

        db.reset(true);
        assert!(db.case_sensitive());
        assert!(db.begin_read().entity_by_id(id).is_none());
    }
}
