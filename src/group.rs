//! Group types.
//!
//! Groups collect entities and other groups and carry policies that their
//! members inherit. Group-to-group membership is stored on the child: a
//! group's `parent_group_ids` lists the groups it is a member of, and the
//! parent relation must stay acyclic.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityId;
use crate::namespace::NamespaceId;

/// Maximum number of member entity IDs one group may hold.
pub const MAX_MEMBER_ENTITY_IDS: usize = 512;

/// Globally unique, stable group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Creates a new random group ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a group ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil group ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GroupId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<GroupId> for Uuid {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

/// A named collection of entities and groups carrying policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Globally unique identifier.
    pub id: GroupId,

    /// Name, unique within the namespace.
    pub name: String,

    /// Namespace the group lives in.
    #[serde(default)]
    pub namespace_id: NamespaceId,

    /// Arbitrary key/value annotations.
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,

    /// Policies granted to members of this group.
    #[serde(default)]
    pub policies: Vec<String>,

    /// Entities that are direct members, deduplicated, at most
    /// [`MAX_MEMBER_ENTITY_IDS`].
    #[serde(default)]
    pub member_entity_ids: Vec<EntityId>,

    /// Groups this group is a direct member of.
    #[serde(default)]
    pub parent_group_ids: Vec<GroupId>,

    /// Counter incremented on every persisted mutation.
    #[serde(default)]
    pub modify_index: u64,

    /// Durable bucket this group is filed under, derived from its ID.
    #[serde(default)]
    pub bucket_key: String,

    /// When the group was first created.
    pub creation_time: DateTime<Utc>,

    /// When the group was last modified.
    pub last_update_time: DateTime<Utc>,
}

impl Group {
    /// Creates a new group with the given name and namespace.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace_id: NamespaceId) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.into(),
            namespace_id,
            metadata: std::collections::BTreeMap::new(),
            policies: Vec::new(),
            member_entity_ids: Vec::new(),
            parent_group_ids: Vec::new(),
            modify_index: 0,
            bucket_key: String::new(),
            creation_time: now,
            last_update_time: now,
        }
    }

    /// Updates the `last_update_time` timestamp.
    pub(crate) fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Group {}

impl std::hash::Hash for Group {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
