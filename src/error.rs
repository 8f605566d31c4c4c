//! Error types for idgraph.
//!
//! All errors are strongly typed using thiserror. Each layer of the store has
//! its own enum so callers can pattern-match on specific conditions: input
//! validation, name conflicts, graph/ownership consistency, and durable
//! storage. Lookups that find nothing return `Ok(None)` rather than an error.

use std::fmt;

use thiserror::Error;

use crate::alias::AliasId;
use crate::entity::EntityId;
use crate::group::GroupId;
use crate::storage::StorageError;

/// Validation errors that occur while checking request input.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: &'static str,
    },

    #[error("entity name is already in use")]
    EntityNameInUse,

    #[error("group name is already in use")]
    GroupNameInUse,

    #[error("policies cannot contain root")]
    RootPolicy,

    #[error("invalid entity ID {id}")]
    InvalidEntityId {
        id: EntityId,
    },

    #[error("invalid alias ID {id}")]
    InvalidAliasId {
        id: AliasId,
    },

    #[error("invalid group ID {id}")]
    InvalidGroupId {
        id: GroupId,
    },

    #[error("invalid entity ID {id} in member entity IDs")]
    InvalidMemberEntity {
        id: EntityId,
    },

    #[error("invalid member group ID {id}")]
    InvalidMemberGroup {
        id: GroupId,
    },

    #[error("group cannot have more than {max} member entity IDs")]
    TooManyMemberEntities {
        max: usize,
    },

    #[error("invalid mount accessor {accessor:?}")]
    InvalidMountAccessor {
        accessor: String,
    },

    #[error("local alias cannot be created for a shared mount")]
    LocalAliasSharedMount,

    #[error("alias against a local mount must be marked local")]
    AliasMustBeLocal,

    #[error("alias local status cannot be updated")]
    AliasLocalImmutable,

    #[error("{kind} does not belong to this namespace")]
    NamespaceMismatch {
        kind: &'static str,
    },

    #[error("entity IDs to merge from and to must be different")]
    MergeSelf,

    #[error("metadata cannot contain more than {max} key/value pairs")]
    MetadataTooManyPairs {
        max: usize,
    },

    #[error("invalid metadata key {key:?}")]
    MetadataKeyInvalid {
        key: String,
    },

    #[error("metadata key {key:?} is too long (maximum {max} characters)")]
    MetadataKeyTooLong {
        key: String,
        max: usize,
    },

    #[error("metadata value for key {key:?} is too long (maximum {max} characters)")]
    MetadataValueTooLong {
        key: String,
        max: usize,
    },

    #[error("metadata key {key:?} is reserved for system use")]
    MetadataKeyReserved {
        key: String,
    },

    #[error("metadata key {key:?} contains invalid characters")]
    MetadataKeyInvalidChars {
        key: String,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Which kind of record a duplicate name was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DuplicateKind {
    /// An entity name collided.
    Entity,
    /// A group name collided.
    Group,
    /// An alias collided on its (mount accessor, name) factors.
    Alias,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Group => write!(f, "group"),
            Self::Alias => write!(f, "alias"),
        }
    }
}

/// Name-collision errors raised by conflict resolvers.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The sentinel duplicate error. Startup loading matches on this to
    /// decide whether to fall back to case-sensitive loading.
    #[error("duplicate identity name: {kind} {name:?}")]
    DuplicateName {
        kind: DuplicateKind,
        name: String,
    },
}

/// Consistency violations: requests that would corrupt the identity graph.
///
/// These are always rejected before any mutation takes place.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("combination of mount and alias name is already in use")]
    AliasFactorsInUse {
        mount_accessor: String,
        name: String,
    },

    #[error("cyclic relationship detected for member group ID {group_id}")]
    CycleDetected {
        group_id: GroupId,
    },

    #[error("member group ID {group_id} is same as the ID of the group")]
    SelfMembership {
        group_id: GroupId,
    },

    #[error("conflicting MFA secret for configuration {config_id:?} (pass force to keep the destination value)")]
    MfaSecretConflict {
        config_id: String,
    },

    #[error("conflicting aliases on mount accessor {mount_accessor:?}; merge one entity at a time")]
    MergeAccessorClash {
        mount_accessor: String,
    },
}

/// Top-level error type for idgraph.
///
/// This enum encompasses all possible errors that can occur when using the
/// identity store.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl IdentityError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if this is a consistency error.
    #[must_use]
    pub const fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error is the duplicate-name sentinel.
    #[must_use]
    pub const fn is_duplicate_name(&self) -> bool {
        matches!(self, Self::Conflict(ConflictError::DuplicateName { .. }))
    }

    /// Returns true if the caller supplied bad input, as opposed to the
    /// store hitting an internal or storage fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::Consistency(_)
        )
    }
}

/// Result type alias for identity store operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
