//! Alias operations.
//!
//! An alias never exists on its own: it is carried inline by its entity,
//! and every alias write lands as a write of the owning entity (or of
//! both entities, when an alias transfers between two). The factor pair
//! `(mount_accessor, name)` is the alias's logical identity; the index
//! over it is what login resolution and conflict checks go through.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alias::{Alias, AliasId};
use crate::entity::{Entity, EntityId};
use crate::error::{ConsistencyError, IdentityError, IdentityResult, ValidationError};
use crate::metadata::validate_metadata;
use crate::mount::MountInfo;
use crate::namespace::Namespace;

use super::IdentityStore;

/// A create-or-update request for an alias.
///
/// Without an `id` the request creates an alias; `name` and
/// `mount_accessor` are then required, and a missing `entity_id` creates
/// a fresh entity to carry it. With an `id` the request updates that
/// alias; fields left `None` keep their current values, and an
/// `entity_id` naming another entity transfers the alias to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasRequest {
    /// Target alias ID, for updates.
    pub id: Option<AliasId>,
    /// Alias name within the mount.
    pub name: Option<String>,
    /// Accessor of the backing mount.
    pub mount_accessor: Option<String>,
    /// Owning entity: the carrier on create, the transfer target on
    /// update.
    pub entity_id: Option<EntityId>,
    /// Replacement metadata map.
    pub metadata: Option<BTreeMap<String, String>>,
    /// Local status. Set on create; immutable afterwards.
    pub local: Option<bool>,
}

/// What an alias write resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct AliasOutcome {
    /// ID of the written alias.
    pub alias_id: AliasId,
    /// Entity carrying it after the write.
    pub entity_id: EntityId,
}

impl IdentityStore {
    /// Creates or updates an alias from the fields of `req`.
    ///
    /// # Errors
    ///
    /// Fails when required fields are missing, the mount accessor does
    /// not resolve, the local flag contradicts the mount or an existing
    /// alias, the factor pair is bound elsewhere, or the durable write
    /// fails.
    pub fn upsert_alias(&self, ns: &Namespace, req: AliasRequest) -> IdentityResult<AliasOutcome> {
        match req.id {
            Some(id) => self.update_alias(ns, id, req),
            None => self.create_alias(ns, req),
        }
    }

    /// Looks up an alias by ID.
    #[must_use]
    pub fn alias_by_id(&self, id: AliasId) -> Option<Arc<Alias>> {
        self.db.begin_read().alias_by_id(id)
    }

    /// Looks up an alias by its factor pair.
    #[must_use]
    pub fn alias_by_factors(&self, mount_accessor: &str, name: &str) -> Option<Arc<Alias>> {
        self.db.begin_read().alias_by_factors(mount_accessor, name)
    }

    /// All aliases in a namespace, sorted by mount accessor then name.
    #[must_use]
    pub fn list_aliases(&self, ns: &Namespace) -> Vec<Arc<Alias>> {
        let mut out = self.db.begin_read().aliases_in_namespace(&ns.id);
        out.sort_by(|a, b| {
            a.mount_accessor
                .cmp(&b.mount_accessor)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        out
    }

    /// Deletes an alias from its entity. Deleting an absent ID is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Fails when the durable write fails.
    pub fn delete_alias_by_id(&self, id: AliasId) -> IdentityResult<()> {
        let Some(current) = self.db.begin_read().alias_by_id(id) else {
            return Ok(());
        };
        let _guard = self
            .entity_locks
            .lock_for(current.entity_id.as_uuid().as_bytes());

        let mut txn = self.db.begin_write();
        let Some(alias) = txn.alias_by_id(id) else {
            return Ok(());
        };
        let owner_arc = txn.entity_by_id(alias.entity_id).ok_or_else(|| {
            IdentityError::internal(format!(
                "alias {} is bound to missing entity {}",
                alias.id, alias.entity_id
            ))
        })?;
        let mut owner = (*owner_arc).clone();
        if owner.remove_alias(id).is_none() {
            return Err(IdentityError::internal(format!(
                "alias {id} is not carried by its entity {}",
                owner.id
            )));
        }
        owner.touch();
        self.upsert_entity_in_txn(&mut txn, &mut owner, None, self.resolver.as_ref(), true)?;
        txn.commit();
        Ok(())
    }

    fn create_alias(&self, ns: &Namespace, req: AliasRequest) -> IdentityResult<AliasOutcome> {
        let name = req.name.unwrap_or_default();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        let accessor = req.mount_accessor.unwrap_or_default();
        if accessor.is_empty() {
            return Err(ValidationError::MissingField {
                field: "mount_accessor",
            }
            .into());
        }
        let local = req.local.unwrap_or(false);

        let mount = self.mounts.validate_accessor(&accessor).ok_or_else(|| {
            ValidationError::InvalidMountAccessor {
                accessor: accessor.clone(),
            }
        })?;
        if local && !mount.local {
            return Err(ValidationError::LocalAliasSharedMount.into());
        }
        if mount.local && !local {
            return Err(ValidationError::AliasMustBeLocal.into());
        }
        if let Some(meta) = &req.metadata {
            validate_metadata(meta)?;
        }

        let _owner_guard = req
            .entity_id
            .map(|id| self.entity_locks.lock_for(id.as_uuid().as_bytes()));
        let mut txn = self.db.begin_write();

        if let Some(existing) = txn.alias_by_factors(&accessor, &name) {
            if req
                .entity_id
                .is_some_and(|target| target != existing.entity_id)
            {
                return Err(ConsistencyError::AliasFactorsInUse {
                    mount_accessor: accessor,
                    name,
                }
                .into());
            }
            // Re-creating the same binding is idempotent; changed metadata
            // is folded into the stored alias.
            let owner_arc = txn.entity_by_id(existing.entity_id).ok_or_else(|| {
                IdentityError::internal(format!(
                    "alias {} is bound to missing entity {}",
                    existing.id, existing.entity_id
                ))
            })?;
            let mut owner = (*owner_arc).clone();
            if let Some(meta) = req.metadata {
                if existing.metadata != meta {
                    if let Some(stored) = owner.alias_by_id_mut(existing.id) {
                        stored.metadata = meta;
                        stored.touch();
                    }
                    self.upsert_entity_in_txn(
                        &mut txn,
                        &mut owner,
                        None,
                        self.resolver.as_ref(),
                        true,
                    )?;
                    txn.commit();
                }
            }
            return Ok(AliasOutcome {
                alias_id: existing.id,
                entity_id: existing.entity_id,
            });
        }

        let mut owner = match req.entity_id {
            Some(id) => {
                let arc = txn
                    .entity_by_id(id)
                    .ok_or(ValidationError::InvalidEntityId { id })?;
                let owner = (*arc).clone();
                if owner.namespace_id != ns.id {
                    return Err(ValidationError::NamespaceMismatch { kind: "entity" }.into());
                }
                owner
            }
            None => Entity::new(String::new(), ns.id.clone()),
        };

        let mut alias = Alias::new(name, owner.id, accessor);
        alias.mount_type = mount.mount_type;
        alias.mount_path = mount.path;
        alias.local = local;
        if let Some(meta) = req.metadata {
            alias.metadata = meta;
        }
        self.sanitize_alias(ns, &mut alias)?;
        let alias_id = alias.id;
        owner.aliases.push(alias);

        self.sanitize_entity(&txn, ns, &mut owner)?;
        self.upsert_entity_in_txn(&mut txn, &mut owner, None, self.resolver.as_ref(), true)?;
        txn.commit();
        Ok(AliasOutcome {
            alias_id,
            entity_id: owner.id,
        })
    }

    fn update_alias(
        &self,
        ns: &Namespace,
        id: AliasId,
        req: AliasRequest,
    ) -> IdentityResult<AliasOutcome> {
        let current = self
            .db
            .begin_read()
            .alias_by_id(id)
            .ok_or(ValidationError::InvalidAliasId { id })?;

        // Lock the current owner and, on a transfer, the target.
        let mut lock_ids: Vec<EntityId> = vec![current.entity_id];
        if let Some(target) = req.entity_id {
            if !lock_ids.contains(&target) {
                lock_ids.push(target);
            }
        }
        let _guards = self
            .entity_locks
            .lock_many(lock_ids.iter().map(|eid| eid.as_uuid().as_bytes().as_slice()));

        let mut txn = self.db.begin_write();
        let alias_arc = txn
            .alias_by_id(id)
            .ok_or(ValidationError::InvalidAliasId { id })?;

        if alias_arc.namespace_id != ns.id {
            return Err(ValidationError::NamespaceMismatch { kind: "alias" }.into());
        }
        if let Some(local) = req.local {
            if local != alias_arc.local {
                return Err(ValidationError::AliasLocalImmutable.into());
            }
        }

        let name = req.name.unwrap_or_else(|| alias_arc.name.clone());
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        let accessor = req
            .mount_accessor
            .unwrap_or_else(|| alias_arc.mount_accessor.clone());
        if accessor.is_empty() {
            return Err(ValidationError::MissingField {
                field: "mount_accessor",
            }
            .into());
        }

        // Moving to another mount re-validates it against the alias's
        // local status.
        let mount: Option<MountInfo> = if accessor != alias_arc.mount_accessor {
            let info = self.mounts.validate_accessor(&accessor).ok_or_else(|| {
                ValidationError::InvalidMountAccessor {
                    accessor: accessor.clone(),
                }
            })?;
            if alias_arc.local && !info.local {
                return Err(ValidationError::LocalAliasSharedMount.into());
            }
            if info.local && !alias_arc.local {
                return Err(ValidationError::AliasMustBeLocal.into());
            }
            Some(info)
        } else {
            None
        };

        let factors_changed = name != alias_arc.name || accessor != alias_arc.mount_accessor;
        if factors_changed {
            if let Some(existing) = txn.alias_by_factors(&accessor, &name) {
                if existing.id != id {
                    return Err(ConsistencyError::AliasFactorsInUse {
                        mount_accessor: accessor,
                        name,
                    }
                    .into());
                }
            }
        }

        if let Some(meta) = &req.metadata {
            validate_metadata(meta)?;
        }

        let target_entity_id = req.entity_id.unwrap_or(alias_arc.entity_id);
        if target_entity_id == alias_arc.entity_id {
            let owner_arc = txn.entity_by_id(alias_arc.entity_id).ok_or_else(|| {
                IdentityError::internal(format!(
                    "alias {id} is bound to missing entity {}",
                    alias_arc.entity_id
                ))
            })?;
            let mut owner = (*owner_arc).clone();
            let owner_id = owner.id;
            let Some(stored) = owner.alias_by_id_mut(id) else {
                return Err(IdentityError::internal(format!(
                    "alias {id} is not carried by its entity {owner_id}"
                )));
            };

            let unchanged = stored.name == name
                && stored.mount_accessor == accessor
                && req.metadata.as_ref().map_or(true, |m| *m == stored.metadata);
            if unchanged {
                return Ok(AliasOutcome {
                    alias_id: id,
                    entity_id: owner_id,
                });
            }

            stored.name = name;
            stored.mount_accessor = accessor;
            if let Some(info) = mount {
                stored.mount_type = info.mount_type;
                stored.mount_path = info.path;
            }
            if let Some(meta) = req.metadata {
                stored.metadata = meta;
            }
            stored.touch();

            self.upsert_entity_in_txn(&mut txn, &mut owner, None, self.resolver.as_ref(), true)?;
            txn.commit();
            Ok(AliasOutcome {
                alias_id: id,
                entity_id: owner_id,
            })
        } else {
            let dest_arc =
                txn.entity_by_id(target_entity_id)
                    .ok_or(ValidationError::InvalidEntityId {
                        id: target_entity_id,
                    })?;
            let mut dest = (*dest_arc).clone();
            if dest.namespace_id != ns.id {
                return Err(ValidationError::NamespaceMismatch { kind: "entity" }.into());
            }
            let source_arc = txn.entity_by_id(alias_arc.entity_id).ok_or_else(|| {
                IdentityError::internal(format!(
                    "alias {id} is bound to missing entity {}",
                    alias_arc.entity_id
                ))
            })?;
            let mut source = (*source_arc).clone();
            let Some(mut moving) = source.remove_alias(id) else {
                return Err(IdentityError::internal(format!(
                    "alias {id} is not carried by its entity {}",
                    source_arc.id
                )));
            };

            tracing::info!(
                alias_id = %id,
                from_entity_id = %source.id,
                to_entity_id = %dest.id,
                "Transferring alias between entities"
            );

            moving.name = name;
            moving.mount_accessor = accessor;
            if let Some(info) = mount {
                moving.mount_type = info.mount_type;
                moving.mount_path = info.path;
            }
            if let Some(meta) = req.metadata {
                moving.metadata = meta;
            }
            moving.entity_id = dest.id;
            moving.touch();
            dest.aliases.push(moving);
            source.touch();

            self.upsert_entity_in_txn(
                &mut txn,
                &mut dest,
                Some(&source),
                self.resolver.as_ref(),
                true,
            )?;
            txn.commit();
            Ok(AliasOutcome {
                alias_id: id,
                entity_id: dest.id,
            })
        }
    }

    /// Validates an alias record and defaults its namespace.
    pub(crate) fn sanitize_alias(&self, ns: &Namespace, alias: &mut Alias) -> IdentityResult<()> {
        if alias.entity_id.is_nil() {
            return Err(ValidationError::MissingField { field: "entity_id" }.into());
        }
        if alias.name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        if alias.mount_accessor.is_empty() {
            return Err(ValidationError::MissingField {
                field: "mount_accessor",
            }
            .into());
        }
        if alias.namespace_id.is_empty() {
            alias.namespace_id = ns.id.clone();
        }
        if alias.namespace_id != ns.id {
            return Err(ValidationError::NamespaceMismatch { kind: "alias" }.into());
        }
        validate_metadata(&alias.metadata)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{MountInfo, StaticMounts};
    use crate::namespace::{NamespaceId, StaticNamespaces};
    use crate::storage::InMemStorage;
    use crate::store::IdentityConfig;

    const USERPASS: &str = "auth_userpass_b2c31f";
    const GITHUB: &str = "auth_github_9f21aa";
    const LOCAL_CERT: &str = "auth_cert_local_44e0";

    fn test_store() -> IdentityStore {
        let mounts = StaticMounts::new();
        mounts.register(MountInfo {
            accessor: USERPASS.to_string(),
            mount_type: "userpass".to_string(),
            path: "auth/userpass/".to_string(),
            local: false,
        });
        mounts.register(MountInfo {
            accessor: GITHUB.to_string(),
            mount_type: "github".to_string(),
            path: "auth/github/".to_string(),
            local: false,
        });
        mounts.register(MountInfo {
            accessor: LOCAL_CERT.to_string(),
            mount_type: "cert".to_string(),
            path: "auth/cert/".to_string(),
            local: true,
        });
        IdentityStore::new(
            Arc::new(InMemStorage::new()),
            Arc::new(StaticNamespaces::new()),
            Arc::new(mounts),
            IdentityConfig::default(),
        )
        .unwrap()
    }

    fn root() -> Namespace {
        Namespace::root()
    }

    fn create_req(name: &str, accessor: &str) -> AliasRequest {
        AliasRequest {
            name: Some(name.to_string()),
            mount_accessor: Some(accessor.to_string()),
            ..AliasRequest::default()
        }
    }

    #[test]
    fn test_create_alias_with_fresh_entity() {
        let store = test_store();
        let outcome = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();

        let alias = store.alias_by_id(outcome.alias_id).unwrap();
        assert_eq!(alias.name, "alice");
        assert_eq!(alias.mount_type, "userpass");
        assert_eq!(alias.mount_path, "auth/userpass/");
        assert_eq!(alias.entity_id, outcome.entity_id);

        // A fresh entity was created to carry it.
        let owner = store.entity_by_id(outcome.entity_id).unwrap();
        assert!(owner.name.starts_with("entity_"));
        assert_eq!(owner.aliases.len(), 1);
    }

    #[test]
    fn test_create_alias_on_existing_entity() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();

        let outcome = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    entity_id: Some(entity.id),
                    ..create_req("alice", USERPASS)
                },
            )
            .unwrap();
        assert_eq!(outcome.entity_id, entity.id);
        assert_eq!(store.entity_count(), 1);

        let owner = store.entity_by_id(entity.id).unwrap();
        assert_eq!(owner.aliases.len(), 1);
    }

    #[test]
    fn test_create_alias_requires_fields() {
        let store = test_store();
        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    mount_accessor: Some(USERPASS.to_string()),
                    ..AliasRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());

        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    name: Some("alice".to_string()),
                    ..AliasRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_create_alias_unknown_mount() {
        let store = test_store();
        let err = store
            .upsert_alias(&root(), create_req("alice", "auth_ghost_000000"))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_create_alias_idempotent() {
        let store = test_store();
        let first = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();
        let second = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();
        assert_eq!(first.alias_id, second.alias_id);
        assert_eq!(first.entity_id, second.entity_id);
        assert_eq!(store.entity_count(), 1);

        // Re-creating with changed metadata refreshes the stored alias.
        let meta = BTreeMap::from([("org".to_string(), "eng".to_string())]);
        store
            .upsert_alias(
                &root(),
                AliasRequest {
                    metadata: Some(meta.clone()),
                    ..create_req("alice", USERPASS)
                },
            )
            .unwrap();
        assert_eq!(store.alias_by_id(first.alias_id).unwrap().metadata, meta);
    }

    #[test]
    fn test_create_alias_factor_conflict() {
        let store = test_store();
        store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();
        let other = store
            .create_entity(&root(), Entity::new("mallory", NamespaceId::root()))
            .unwrap();

        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    entity_id: Some(other.id),
                    ..create_req("alice", USERPASS)
                },
            )
            .unwrap_err();
        assert!(err.is_consistency());
    }

    #[test]
    fn test_local_flag_must_match_mount() {
        let store = test_store();

        // Local alias on a shared mount.
        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    local: Some(true),
                    ..create_req("alice", USERPASS)
                },
            )
            .unwrap_err();
        assert!(err.is_validation());

        // Shared alias on a local mount.
        let err = store
            .upsert_alias(&root(), create_req("alice", LOCAL_CERT))
            .unwrap_err();
        assert!(err.is_validation());

        // Local alias on a local mount.
        let outcome = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    local: Some(true),
                    ..create_req("alice", LOCAL_CERT)
                },
            )
            .unwrap();
        assert!(store.alias_by_id(outcome.alias_id).unwrap().local);
    }

    #[test]
    fn test_update_alias_rename() {
        let store = test_store();
        let created = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();

        store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(created.alias_id),
                    name: Some("alice-renamed".to_string()),
                    ..AliasRequest::default()
                },
            )
            .unwrap();

        assert!(store.alias_by_factors(USERPASS, "alice").is_none());
        let moved = store.alias_by_factors(USERPASS, "alice-renamed").unwrap();
        assert_eq!(moved.id, created.alias_id);
    }

    #[test]
    fn test_update_alias_case_only_rename() {
        let store = test_store();
        let created = store
            .upsert_alias(&root(), create_req("Alice", USERPASS))
            .unwrap();

        // The folded index entry is the alias itself, so this is a plain
        // rename, not a conflict.
        store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(created.alias_id),
                    name: Some("alice".to_string()),
                    ..AliasRequest::default()
                },
            )
            .unwrap();
        assert_eq!(store.alias_by_id(created.alias_id).unwrap().name, "alice");
    }

    #[test]
    fn test_update_alias_factor_conflict() {
        let store = test_store();
        store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();
        let bob = store
            .upsert_alias(&root(), create_req("bob", USERPASS))
            .unwrap();

        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(bob.alias_id),
                    name: Some("alice".to_string()),
                    ..AliasRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_consistency());
    }

    #[test]
    fn test_update_alias_local_immutable() {
        let store = test_store();
        let created = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();

        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(created.alias_id),
                    local: Some(true),
                    ..AliasRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_update_alias_transfer() {
        let store = test_store();
        let created = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();
        let dest = store
            .create_entity(&root(), Entity::new("bob", NamespaceId::root()))
            .unwrap();

        store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(created.alias_id),
                    entity_id: Some(dest.id),
                    ..AliasRequest::default()
                },
            )
            .unwrap();

        // Index and both entities reflect the move, durably.
        let moved = store.alias_by_factors(USERPASS, "alice").unwrap();
        assert_eq!(moved.entity_id, dest.id);
        assert!(store
            .entity_by_id(created.entity_id)
            .unwrap()
            .aliases
            .is_empty());
        let dest_record = store.entity_by_id(dest.id).unwrap();
        assert_eq!(dest_record.aliases.len(), 1);

        let stored: Entity = store
            .entity_packer
            .get_item(&dest_record.bucket_key, &dest.id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(stored.aliases.len(), 1);
    }

    #[test]
    fn test_update_missing_alias() {
        let store = test_store();
        let err = store
            .upsert_alias(
                &root(),
                AliasRequest {
                    id: Some(AliasId::new()),
                    ..AliasRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_delete_alias() {
        let store = test_store();
        let created = store
            .upsert_alias(&root(), create_req("alice", USERPASS))
            .unwrap();

        store.delete_alias_by_id(created.alias_id).unwrap();
        assert!(store.alias_by_id(created.alias_id).is_none());
        assert!(store.alias_by_factors(USERPASS, "alice").is_none());

        // The entity survives without the alias.
        let owner = store.entity_by_id(created.entity_id).unwrap();
        assert!(owner.aliases.is_empty());

        // Absent ID is a no-op.
        store.delete_alias_by_id(created.alias_id).unwrap();
    }

    #[test]
    fn test_list_aliases_sorted() {
        let store = test_store();
        store
            .upsert_alias(&root(), create_req("zed", USERPASS))
            .unwrap();
        store
            .upsert_alias(&root(), create_req("amy", USERPASS))
            .unwrap();
        store
            .upsert_alias(&root(), create_req("mid", GITHUB))
            .unwrap();

        let names: Vec<(String, String)> = store
            .list_aliases(&root())
            .iter()
            .map(|a| (a.mount_accessor.clone(), a.name.clone()))
            .collect();
        assert_eq!(
            names,
            vec![
                (GITHUB.to_string(), "mid".to_string()),
                (USERPASS.to_string(), "amy".to_string()),
                (USERPASS.to_string(), "zed".to_string()),
            ]
        );
    }
}
