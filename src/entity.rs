//! Entity types and identity management.
//!
//! The entity is the anchor of identity: every credential that logs in is
//! resolved to exactly one entity, and policies, metadata, and MFA secrets
//! hang off it. Aliases are stored inline on their owning entity.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alias::{Alias, AliasId};
use crate::namespace::NamespaceId;

/// Globally unique, stable entity identifier.
///
/// Once created, an `EntityId` never changes. Merges retire an entity ID but
/// never reuse it; lookups through a retired ID resolve to the entity it was
/// merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
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

    /// Creates a nil entity ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// An opaque MFA secret blob, keyed on the entity by configuration ID.
///
/// The store never interprets the bytes; it only carries them through
/// persistence and merges. `Debug` is redacted so secrets cannot leak into
/// logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MfaSecret(Vec<u8>);

impl MfaSecret {
    /// Wraps raw secret bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MfaSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MfaSecret(..)")
    }
}

/// The anchor of identity.
///
/// An entity represents one principal. All of its credentials are recorded
/// as inline [`Alias`] values whose `entity_id` equals this entity's ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique identifier.
    pub id: EntityId,

    /// Name, unique within the namespace.
    pub name: String,

    /// Namespace the entity lives in.
    #[serde(default)]
    pub namespace_id: NamespaceId,

    /// Arbitrary key/value annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Policies directly attached to the entity.
    #[serde(default)]
    pub policies: Vec<String>,

    /// True when logins through this entity's aliases are blocked.
    #[serde(default)]
    pub disabled: bool,

    /// Credential bindings owned by this entity.
    #[serde(default)]
    pub aliases: Vec<Alias>,

    /// IDs of entities that were merged into this one, transitively.
    #[serde(default)]
    pub merged_entity_ids: Vec<EntityId>,

    /// Durable bucket this entity is filed under, derived from its ID.
    #[serde(default)]
    pub bucket_key: String,

    /// When the entity was first created.
    pub creation_time: DateTime<Utc>,

    /// When the entity was last modified.
    pub last_update_time: DateTime<Utc>,

    /// MFA secrets keyed by MFA configuration ID.
    #[serde(default)]
    pub mfa_secrets: BTreeMap<String, MfaSecret>,
}

impl Entity {
    /// Creates a new entity with the given name and namespace.
    ///
    /// The bucket key is derived later, during sanitization, so that the
    /// derivation lives next to the bucket layout it must match.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace_id: NamespaceId) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            namespace_id,
            metadata: BTreeMap::new(),
            policies: Vec::new(),
            disabled: false,
            aliases: Vec::new(),
            merged_entity_ids: Vec::new(),
            bucket_key: String::new(),
            creation_time: now,
            last_update_time: now,
            mfa_secrets: BTreeMap::new(),
        }
    }

    /// Looks up an inline alias by ID.
    #[must_use]
    pub fn alias_by_id(&self, id: AliasId) -> Option<&Alias> {
        self.aliases.iter().find(|a| a.id == id)
    }

    /// Looks up an inline alias by ID, mutably.
    pub(crate) fn alias_by_id_mut(&mut self, id: AliasId) -> Option<&mut Alias> {
        self.aliases.iter_mut().find(|a| a.id == id)
    }

    /// Removes an inline alias by ID. Returns the removed alias.
    pub(crate) fn remove_alias(&mut self, id: AliasId) -> Option<Alias> {
        let idx = self.aliases.iter().position(|a| a.id == id)?;
        Some(self.aliases.remove(idx))
    }

    /// Updates the `last_update_time` timestamp.
    pub(crate) fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
