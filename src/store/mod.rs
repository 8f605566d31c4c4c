//! The identity store.
//!
//! [`IdentityStore`] ties the pieces together: the indexed in-memory image,
//! the two durable bucket packers, the namespace and mount directories
//! supplied by the embedding application, and a name-conflict strategy.
//! Entity, alias, and group operations live in the submodules; this module
//! owns construction, configuration, and the startup load with its
//! case-sensitivity fallback.
//!
//! Locking discipline: operations take record locks (entity shards, the
//! group lock) before opening the write transaction and never the other way
//! around. When both are needed, entity locks come before the group lock.
//! The write transaction is held across durable persistence, so the bucket
//! write and the in-memory publish of one operation are never interleaved
//! with another writer's.

mod aliases;
mod entities;
mod groups;
mod restore;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::conflict::{
    ConflictResolver, DuplicateReport, DuplicateReporter, ErrorReportResolver, RenameResolver,
};
use crate::entity::Entity;
use crate::error::{IdentityResult, ValidationError};
use crate::group::Group;
use crate::locks::LockTable;
use crate::memdb::IndexedDb;
use crate::mount::MountValidator;
use crate::namespace::NamespaceService;
use crate::storage::bucket::{BucketStore, ENTITY_PACKER_PREFIX, GROUP_PACKER_PREFIX};
use crate::storage::StorageBackend;

pub use self::aliases::{AliasOutcome, AliasRequest};
pub use self::entities::{
    AliasDetails, EntityDetails, EntityUpdateOutcome, EntityUpdateRequest, MergeRequest,
};
pub use self::groups::{GroupRequest, GroupUpdateOutcome};

/// Tunables for an [`IdentityStore`].
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Number of worker threads fetching and decoding entity buckets during
    /// the startup load.
    pub restore_workers: usize,

    /// Upper bound on records staged in one restore transaction. An entity
    /// weighs one plus its alias count.
    pub restore_tx_batch: usize,

    /// Rename colliding names deterministically instead of failing them.
    pub deduplicate_names: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            restore_workers: 64,
            restore_tx_batch: 1024,
            deduplicate_names: false,
        }
    }
}

impl IdentityConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.restore_workers == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "restore_workers must be at least 1".to_string(),
            });
        }
        if self.restore_tx_batch == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "restore_tx_batch must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// An embedded store of entities, their aliases, and groups.
///
/// The in-memory image is a rebuildable cache: every mutation is persisted
/// through a bucket packer before it is published, and
/// [`load_artifacts`](IdentityStore::load_artifacts) rebuilds the image from
/// durable storage at startup.
pub struct IdentityStore {
    db: IndexedDb,
    entity_packer: BucketStore<Entity>,
    group_packer: BucketStore<Group>,
    namespaces: Arc<dyn NamespaceService>,
    mounts: Arc<dyn MountValidator>,
    resolver: Arc<dyn ConflictResolver>,

    /// Serializes read-modify-write sequences on individual entities.
    entity_locks: LockTable,
    /// Serializes the login path's check-then-create on alias factors.
    factor_locks: LockTable,
    /// Serializes all group mutations; the membership graph is checked as a
    /// whole on every write.
    group_lock: Mutex<()>,

    config: IdentityConfig,
    last_duplicate_report: Mutex<Option<DuplicateReport>>,
}

impl IdentityStore {
    /// Creates a store on top of the given storage backend and directories.
    ///
    /// The store starts empty and case-insensitive; call
    /// [`load_artifacts`](IdentityStore::load_artifacts) to populate it from
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidConfig`] when the configuration is
    /// out of range.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        namespaces: Arc<dyn NamespaceService>,
        mounts: Arc<dyn MountValidator>,
        config: IdentityConfig,
    ) -> IdentityResult<Self> {
        config.validate()?;
        let resolver: Arc<dyn ConflictResolver> = if config.deduplicate_names {
            Arc::new(RenameResolver)
        } else {
            Arc::new(ErrorReportResolver)
        };
        Ok(Self {
            db: IndexedDb::new(false),
            entity_packer: BucketStore::new(Arc::clone(&storage), ENTITY_PACKER_PREFIX),
            group_packer: BucketStore::new(storage, GROUP_PACKER_PREFIX),
            namespaces,
            mounts,
            resolver,
            entity_locks: LockTable::new(),
            factor_locks: LockTable::new(),
            group_lock: Mutex::new(()),
            config,
            last_duplicate_report: Mutex::new(None),
        })
    }

    /// Rebuilds the in-memory image from durable storage.
    ///
    /// Entities load first, on a bounded worker pool; groups load after
    /// them, synchronously. When the configured resolver fails the load with
    /// the duplicate-name sentinel, the store switches to case-sensitive
    /// name matching and reloads once, collecting a [`DuplicateReport`] of
    /// everything that still collides byte-for-byte.
    ///
    /// # Errors
    ///
    /// Fails on the first storage, decode, or resolver error; the image may
    /// then be partially populated and should not be served.
    pub fn load_artifacts(&self) -> IdentityResult<()> {
        let resolver = Arc::clone(&self.resolver);
        match self.load_all(resolver.as_ref()) {
            Ok(()) => Ok(()),
            Err(err) if err.is_duplicate_name() => {
                tracing::warn!(error = %err, "Enabling case sensitive identity names");
                self.db.reset(true);

                let reporter = DuplicateReporter::new();
                let outcome = self.load_all(&reporter);
                let report = reporter.take_report();
                if !report.is_empty() {
                    report.log();
                }
                let mut slot = self
                    .last_duplicate_report
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *slot = Some(report);
                outcome
            }
            Err(err) => Err(err),
        }
    }

    fn load_all(&self, resolver: &dyn ConflictResolver) -> IdentityResult<()> {
        self.load_entities(resolver)?;
        self.load_groups(resolver)
    }

    /// Whether name matching is currently case-sensitive.
    #[must_use]
    pub fn case_sensitive(&self) -> bool {
        self.db.case_sensitive()
    }

    /// The report collected by the last case-sensitive fallback load, if one
    /// happened.
    #[must_use]
    pub fn duplicate_report(&self) -> Option<DuplicateReport> {
        self.last_duplicate_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of entities in the in-memory image.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.db.begin_read().entity_count()
    }

    /// Number of groups in the in-memory image.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.db.begin_read().group_count()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityStore")
            .field("config", &self.config)
            .field("case_sensitive", &self.db.case_sensitive())
            .finish_non_exhaustive()
    }
}

/// Trims, drops empties, and dedups a policy list into sorted order.
fn normalize_policies(policies: Vec<String>) -> Vec<String> {
    let set: std::collections::BTreeSet<String> = policies
        .into_iter()
        .map(|policy| policy.trim().to_string())
        .filter(|policy| !policy.is_empty())
        .collect();
    set.into_iter().collect()
}

/// A free name of the form `{prefix}_{8 hex chars}`.
///
/// Loops until the candidate is not in use, so generated names never
/// collide with each other or with user-chosen names of the same shape.
fn generate_name(prefix: &str, in_use: impl Fn(&str) -> bool) -> String {
    loop {
        let b = Uuid::new_v4().into_bytes();
        let tag = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let name = format!("{prefix}_{tag:08x}");
        if !in_use(&name) {
            return name;
        }
    }
}
