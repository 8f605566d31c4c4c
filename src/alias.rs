//! Alias types.
//!
//! An alias binds one credential from one auth mount to a canonical entity.
//! Aliases never exist on their own: they are stored inline on their owning
//! entity and mirrored into the in-memory index for factor lookups.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityId;
use crate::namespace::NamespaceId;

/// Globally unique, stable alias identifier.
///
/// Once created, an `AliasId` never changes, even when the alias is
/// re-pointed to another entity during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasId(Uuid);

impl AliasId {
    /// Creates a new random alias ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an alias ID from an existing UUID.
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

    /// Creates a nil alias ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for AliasId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AliasId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AliasId> for Uuid {
    fn from(id: AliasId) -> Self {
        id.0
    }
}

/// The pair of values that uniquely identifies an alias across the store.
///
/// Two credentials from the same mount with the same name are the same
/// login, so at most one alias may carry any given factor pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasFactors {
    /// Accessor of the auth mount that produced the credential.
    pub mount_accessor: String,
    /// Name of the credential within that mount, e.g. a username.
    pub name: String,
}

/// A credential-to-entity binding.
///
/// The mount type and path are denormalized copies of the mount's properties
/// at write time, kept for display; the accessor is the authoritative link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    /// Globally unique identifier.
    pub id: AliasId,

    /// Name of the credential within its mount.
    pub name: String,

    /// ID of the entity this alias belongs to.
    pub entity_id: EntityId,

    /// Accessor of the mount that produced this alias.
    pub mount_accessor: String,

    /// Backend type of the mount, copied at write time.
    #[serde(default)]
    pub mount_type: String,

    /// Path of the mount, copied at write time.
    #[serde(default)]
    pub mount_path: String,

    /// Namespace the alias lives in; always the owning entity's namespace.
    #[serde(default)]
    pub namespace_id: NamespaceId,

    /// True when the alias was produced by a local (non-replicated) mount.
    #[serde(default)]
    pub local: bool,

    /// Arbitrary key/value annotations.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// IDs of entities this alias belonged to before merges re-pointed it.
    #[serde(default)]
    pub merged_from_entity_ids: Vec<EntityId>,

    /// When the alias was first created.
    pub creation_time: DateTime<Utc>,

    /// When the alias was last modified.
    pub last_update_time: DateTime<Utc>,
}

impl Alias {
    /// Creates an alias binding `name` on the given mount to an entity.
    ///
    /// The mount's type and path and the namespace are filled in during
    /// sanitization, when the mount accessor is validated.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity_id: EntityId,
        mount_accessor: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AliasId::new(),
            name: name.into(),
            entity_id,
            mount_accessor: mount_accessor.into(),
            mount_type: String::new(),
            mount_path: String::new(),
            namespace_id: NamespaceId::default(),
            local: false,
            metadata: BTreeMap::new(),
            merged_from_entity_ids: Vec::new(),
            creation_time: now,
            last_update_time: now,
        }
    }

    /// Returns the factor pair that identifies this alias.
    #[must_use]
    pub fn factors(&self) -> AliasFactors {
        AliasFactors {
            mount_accessor: self.mount_accessor.clone(),
            name: self.name.clone(),
        }
    }

    /// Updates the `last_update_time` timestamp.
    pub(crate) fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }
}

impl PartialEq for Alias {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Alias {}

impl std::hash::Hash for Alias {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_id_creation() {
        let id1 = AliasId::new();
        let id2 = AliasId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_nil());
    }

    #[test]
    fn test_alias_id_display() {
        let id = AliasId::new();
        assert!(format!("{id}").contains('-'));
    }

    #[test]
    fn test_alias_factors() {
        let alias = Alias::new("bob", EntityId::new(), "auth_userpass_b2c31f");
        let factors = alias.factors();
        assert_eq!(factors.mount_accessor, "auth_userpass_b2c31f");
        assert_eq!(factors.name, "bob");
    }

    #[test]
    fn test_alias_equality_is_by_id() {
        let entity_id = EntityId::new();
        let mut a = Alias::new("bob", entity_id, "auth_userpass_b2c31f");
        let mut b = a.clone();
        b.name = "robert".to_string();
        assert_eq!(a, b);

        a.id = AliasId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_alias_serialization_defaults() {
        // Old durable records may lack the fields added later.
        let json = format!(
            "{{\"id\":\"{}\",\"name\":\"bob\",\"entity_id\":\"{}\",\
             \"mount_accessor\":\"auth_userpass_b2c31f\",\
             \"creation_time\":\"2024-01-01T00:00:00Z\",\
             \"last_update_time\":\"2024-01-01T00:00:00Z\"}}",
            AliasId::new(),
            EntityId::new(),
        );
        let alias: Alias = serde_json::from_str(&json).unwrap();
        assert!(!alias.local);
        assert!(alias.metadata.is_empty());
        assert!(alias.merged_from_entity_ids.is_empty());
        assert!(alias.namespace_id.is_empty());
    }
}
