//! Read and write transactions.
//!
//! A read transaction is a reference-counted snapshot: it observes the state
//! published by the last committed write and nothing after. A write
//! transaction works on a private clone of the current state; commit
//! publishes the clone in one pointer swap, and dropping without commit
//! discards it with no visible effect.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, MutexGuard, PoisonError};

use super::tables::DbState;
use super::IndexedDb;

/// A consistent point-in-time view of the store.
pub(crate) struct ReadTxn {
    snapshot: Arc<DbState>,
}

impl ReadTxn {
    pub(super) fn new(snapshot: Arc<DbState>) -> Self {
        Self { snapshot }
    }
}

impl Deref for ReadTxn {
    type Target = DbState;

    fn deref(&self) -> &DbState {
        &self.snapshot
    }
}

/// An exclusive write transaction.
///
/// Holds the writer lock for its whole lifetime, so at most one write
/// transaction exists at a time.
pub(crate) struct WriteTxn<'db> {
    db: &'db IndexedDb,
    state: DbState,
    _guard: MutexGuard<'db, ()>,
}

impl<'db> WriteTxn<'db> {
    pub(super) fn new(db: &'db IndexedDb, state: DbState, guard: MutexGuard<'db, ()>) -> Self {
        Self {
            db,
            state,
            _guard: guard,
        }
    }

    /// Publishes every change made through this transaction.
    pub(crate) fn commit(self) {
        let db = self.db;
        let state = self.state;
        // A poisoned lock still holds a complete snapshot; publication is a
        // single assignment under the guard.
        let mut current = db.state.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(state);
    }

    /// Discards every change made through this transaction.
    pub(crate) fn abort(self) {}
}

impl Deref for WriteTxn<'_> {
    type Target = DbState;

    fn deref(&self) -> &DbState {
        &self.state
    }
}

impl DerefMut for WriteTxn<'_> {
    fn deref_mut(&mut self) -> &mut DbState {
        &mut self.state
    }
}
