//! # idgraph - An embedded identity graph
//!
//! idgraph tracks who a client is across the credential backends they log
//! in through. Logins on different mounts resolve to one entity via
//! aliases, entities gather into groups with nested membership, and both
//! carry policies and metadata. Everything lives in an indexed in-memory
//! image that is rebuilt from durable bucket storage at startup.
//!
//! ## Core Concepts
//!
//! - **Entity**: one principal, owning policies, metadata, and aliases
//! - **Alias**: a (mount accessor, name) credential bound to its entity
//! - **Group**: a set of member entities and child groups whose policies
//!   flow to every transitive member
//! - **IdentityStore**: the store tying the image, durable packers, and
//!   conflict handling together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use idgraph::{
//!     Entity, IdentityConfig, IdentityStore, InMemStorage, Namespace,
//!     NamespaceId, StaticMounts, StaticNamespaces,
//! };
//!
//! let store = IdentityStore::new(
//!     Arc::new(InMemStorage::new()),
//!     Arc::new(StaticNamespaces::new()),
//!     Arc::new(StaticMounts::new()),
//!     IdentityConfig::default(),
//! )?;
//! store.load_artifacts()?;
//!
//! let ns = Namespace::root();
//! let alice = store.create_entity(&ns, Entity::new("alice", NamespaceId::root()))?;
//! let (entity, created) = store.create_or_fetch_entity(&ns, "auth_userpass_1", "alice", None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Records
pub mod alias;
pub mod entity;
pub mod group;
pub mod metadata;
pub mod namespace;

// Surroundings the embedding application provides
pub mod conflict;
pub mod error;
pub mod mount;

// Durability and the in-memory image
mod locks;
mod memdb;
pub mod storage;

// The store
pub mod store;

// Re-export primary types at crate root for convenience
pub use alias::{Alias, AliasFactors, AliasId};
pub use conflict::{
    ConflictResolver, DuplicateReport, DuplicateReporter, DuplicateSet, ErrorReportResolver,
    RenameResolver,
};
pub use entity::{Entity, EntityId};
pub use error::{
    ConflictError, ConsistencyError, DuplicateKind, IdentityError, IdentityResult, ValidationError,
};
pub use group::{Group, GroupId};
pub use mount::{MountInfo, MountValidator, StaticMounts};
pub use namespace::{Namespace, NamespaceId, NamespaceService, StaticNamespaces};
pub use storage::file::FileStorage;
pub use storage::{InMemStorage, StorageBackend, StorageError};
pub use store::{
    AliasOutcome, AliasRequest, EntityDetails, EntityUpdateOutcome, EntityUpdateRequest,
    GroupRequest, GroupUpdateOutcome, IdentityConfig, IdentityStore, MergeRequest,
};
