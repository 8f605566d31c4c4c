//! Entity operations: create, update, read, list, delete, merge, and the
//! login-path create-or-fetch.
//!
//! Every write resolves its target inside the write transaction it commits
//! through, so a check-then-act sequence can never act on a stale image.
//! The per-entity shard locks taken before the transaction only order
//! concurrent writers of the same record; correctness never depends on them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alias::{Alias, AliasId};
use crate::conflict::ConflictResolver;
use crate::entity::{Entity, EntityId};
use crate::error::{ConsistencyError, IdentityError, IdentityResult, ValidationError};
use crate::group::GroupId;
use crate::memdb::WriteTxn;
use crate::metadata::validate_metadata;
use crate::namespace::{Namespace, NamespaceId};
use crate::storage::bucket::bucket_key_for_id;

use super::IdentityStore;

/// A create-or-update request for an entity.
///
/// With an `id` the request addresses that entity; with only a `name` it
/// addresses the entity of that name, creating one when none exists; with
/// neither it creates a new entity under a generated name. Fields left
/// `None` keep their current values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityUpdateRequest {
    /// Target entity ID.
    pub id: Option<EntityId>,
    /// Target (or new) entity name.
    pub name: Option<String>,
    /// Replacement policy list.
    pub policies: Option<Vec<String>>,
    /// Replacement disabled flag.
    pub disabled: Option<bool>,
    /// Replacement metadata map.
    pub metadata: Option<BTreeMap<String, String>>,
}

/// What an entity write resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct EntityUpdateOutcome {
    /// ID of the written entity.
    pub id: EntityId,
    /// Final name, which may have been generated.
    pub name: String,
    /// IDs of the entity's aliases after the write.
    pub alias_ids: Vec<AliasId>,
    /// True when the write created the entity.
    pub created: bool,
}

/// A request to merge one or more entities into a surviving destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    /// The surviving entity.
    pub to_entity_id: EntityId,
    /// Entities to drain into the destination and delete.
    pub from_entity_ids: Vec<EntityId>,
    /// Proceed past MFA secret conflicts, keeping the destination's value.
    pub force: bool,
    /// Union the source entities' policies into the destination.
    pub merge_policies: bool,
}

/// A read projection of an entity, with live mount information on its
/// aliases and its group memberships resolved.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDetails {
    /// Entity ID.
    pub id: EntityId,
    /// Entity name.
    pub name: String,
    /// Owning namespace.
    pub namespace_id: NamespaceId,
    /// Entity metadata.
    pub metadata: BTreeMap<String, String>,
    /// Directly attached policies.
    pub policies: Vec<String>,
    /// True when login through this entity is blocked.
    pub disabled: bool,
    /// The entity's aliases.
    pub aliases: Vec<AliasDetails>,
    /// IDs of entities merged into this one.
    pub merged_entity_ids: Vec<EntityId>,
    /// Groups listing this entity as a member.
    pub direct_group_ids: Vec<GroupId>,
    /// Groups reached only through nesting.
    pub inherited_group_ids: Vec<GroupId>,
    /// Creation timestamp.
    pub creation_time: DateTime<Utc>,
    /// Last-modification timestamp.
    pub last_update_time: DateTime<Utc>,
}

/// An alias inside [`EntityDetails`].
///
/// `mount_type` and `mount_path` reflect the mount directory at read time
/// when the accessor still resolves, falling back to the values stamped at
/// write time when it does not.
#[derive(Debug, Clone, Serialize)]
pub struct AliasDetails {
    /// Alias ID.
    pub id: AliasId,
    /// Alias name within the mount.
    pub name: String,
    /// Accessor of the backing mount.
    pub mount_accessor: String,
    /// Type of the backing mount.
    pub mount_type: String,
    /// Path of the backing mount.
    pub mount_path: String,
    /// True for aliases on node-local mounts.
    pub local: bool,
    /// Alias metadata.
    pub metadata: BTreeMap<String, String>,
    /// Creation timestamp.
    pub creation_time: DateTime<Utc>,
    /// Last-modification timestamp.
    pub last_update_time: DateTime<Utc>,
}

impl IdentityStore {
    /// Creates an entity from a prepared record.
    ///
    /// An empty name is replaced with a generated one; an empty namespace
    /// defaults to `ns`. Inline aliases are sanitized and indexed along
    /// with the entity.
    ///
    /// # Errors
    ///
    /// Fails when the name or an alias factor pair is already taken, when
    /// the record fails validation, or when the durable write fails.
    pub fn create_entity(&self, ns: &Namespace, mut entity: Entity) -> IdentityResult<Entity> {
        if entity.namespace_id.is_empty() {
            entity.namespace_id = ns.id.clone();
        }
        if entity.policies.iter().any(|p| p == "root") {
            return Err(ValidationError::RootPolicy.into());
        }
        for alias in &mut entity.aliases {
            self.sanitize_alias(ns, alias)?;
        }

        let mut txn = self.db.begin_write();
        if !entity.name.is_empty() {
            self.check_entity_name(&txn, &mut entity, self.resolver.as_ref())?;
        }
        self.sanitize_entity(&txn, ns, &mut entity)?;
        self.upsert_entity_in_txn(&mut txn, &mut entity, None, self.resolver.as_ref(), true)?;
        txn.commit();
        Ok(entity)
    }

    /// Creates or updates an entity from the fields of `req`.
    ///
    /// # Errors
    ///
    /// Fails when the request addresses a missing ID, renames onto a taken
    /// name, carries the `root` policy, fails validation, or the durable
    /// write fails.
    pub fn update_entity(
        &self,
        ns: &Namespace,
        req: EntityUpdateRequest,
    ) -> IdentityResult<EntityUpdateOutcome> {
        // Order concurrent writers of the same record before entering the
        // write transaction.
        let lock_target = match (req.id, req.name.as_deref()) {
            (Some(id), _) => Some(id),
            (None, Some(name)) => self
                .db
                .begin_read()
                .entity_by_name(&ns.id, name)
                .map(|e| e.id),
            (None, None) => None,
        };
        let _guard = lock_target.map(|id| self.entity_locks.lock_for(id.as_uuid().as_bytes()));

        let resolver = self.resolver.as_ref();
        let mut txn = self.db.begin_write();

        // Resolve the target again inside the transaction; the image may
        // have moved while waiting for the lock.
        let mut target: Option<Arc<Entity>> = None;
        if let Some(id) = req.id {
            target = Some(
                txn.entity_by_id(id)
                    .ok_or(ValidationError::InvalidEntityId { id })?,
            );
        }
        if let Some(name) = req.name.as_deref() {
            if let Some(by_name) = txn.entity_by_name(&ns.id, name) {
                match &target {
                    None => target = Some(by_name),
                    Some(t) if t.id == by_name.id => {}
                    Some(_) if by_name.name == name => {
                        return Err(ValidationError::EntityNameInUse.into());
                    }
                    // A case variant of another entity's name; the active
                    // strategy rules on it below.
                    Some(_) => {}
                }
            }
        }

        let created = target.is_none();
        let mut entity = match target {
            Some(arc) => (*arc).clone(),
            None => Entity::new(String::new(), ns.id.clone()),
        };

        if let Some(name) = req.name {
            entity.name = name;
        }
        if let Some(policies) = req.policies {
            entity.policies = super::normalize_policies(policies);
        }
        if entity.policies.iter().any(|p| p == "root") {
            return Err(ValidationError::RootPolicy.into());
        }
        if let Some(disabled) = req.disabled {
            entity.disabled = disabled;
        }
        if let Some(metadata) = req.metadata {
            entity.metadata = metadata;
        }

        if !entity.name.is_empty() {
            self.check_entity_name(&txn, &mut entity, resolver)?;
        }
        self.sanitize_entity(&txn, ns, &mut entity)?;
        self.upsert_entity_in_txn(&mut txn, &mut entity, None, resolver, true)?;
        txn.commit();

        Ok(EntityUpdateOutcome {
            id: entity.id,
            name: entity.name,
            alias_ids: entity.aliases.iter().map(|a| a.id).collect(),
            created,
        })
    }

    /// Deletes an entity, scrubbing it from every group it is a member of.
    /// Deleting an absent ID is a no-op.
    ///
    /// # Errors
    ///
    /// Fails when a durable write fails.
    pub fn delete_entity_by_id(&self, id: EntityId) -> IdentityResult<()> {
        let _guard = self.entity_locks.lock_for(id.as_uuid().as_bytes());
        let _groups = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = self.db.begin_write();
        let Some(entity) = txn.entity_by_id(id) else {
            return Ok(());
        };
        self.delete_entity_in_txn(&mut txn, &entity)?;
        txn.commit();
        Ok(())
    }

    /// Deletes the entity holding `name`, if any.
    ///
    /// # Errors
    ///
    /// Fails when a durable write fails.
    pub fn delete_entity_by_name(&self, ns: &Namespace, name: &str) -> IdentityResult<()> {
        let candidate = self.db.begin_read().entity_by_name(&ns.id, name);
        let _guard = candidate
            .as_ref()
            .map(|e| self.entity_locks.lock_for(e.id.as_uuid().as_bytes()));
        let _groups = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = self.db.begin_write();
        let Some(entity) = txn.entity_by_name(&ns.id, name) else {
            return Ok(());
        };
        self.delete_entity_in_txn(&mut txn, &entity)?;
        txn.commit();
        Ok(())
    }

    /// Deletes a batch of entities in one transaction, rewriting each
    /// touched storage bucket once. Absent IDs are skipped.
    ///
    /// # Errors
    ///
    /// Fails when a durable write fails; already-applied deletions from
    /// the same batch stay applied.
    pub fn batch_delete_entities(&self, ids: &[EntityId]) -> IdentityResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut unique: Vec<EntityId> = ids.to_vec();
        unique.sort_unstable_by(|a, b| a.as_uuid().cmp(b.as_uuid()));
        unique.dedup();

        let _guards = self
            .entity_locks
            .lock_many(unique.iter().map(|id| id.as_uuid().as_bytes().as_slice()));
        let _groups = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = self.db.begin_write();
        let mut by_bucket: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in &unique {
            let Some(entity) = txn.entity_by_id(*id) else {
                continue;
            };
            self.remove_entity_from_groups(&mut txn, entity.id)?;
            txn.delete_entity(entity.id);
            by_bucket
                .entry(entity.bucket_key.clone())
                .or_default()
                .push(entity.id.to_string());
        }
        for (bucket_key, item_ids) in &by_bucket {
            self.entity_packer
                .delete_items(bucket_key, item_ids.iter().map(String::as_str))?;
        }
        txn.commit();
        Ok(())
    }

    /// Merges the source entities into the destination.
    ///
    /// Aliases, merged-ID history, group memberships, and (optionally)
    /// policies move to the destination; MFA secrets the destination lacks
    /// are copied over; the sources are then deleted. Source IDs keep
    /// resolving through [`IdentityStore::entity_by_id`]. Nothing is
    /// validated as merged until every source has been checked.
    ///
    /// # Errors
    ///
    /// Fails when a source is the destination or missing, namespaces
    /// differ, two merged entities hold aliases on the same mount
    /// accessor, or an MFA secret conflicts without `force`.
    pub fn merge_entities(&self, ns: &Namespace, req: MergeRequest) -> IdentityResult<()> {
        let mut sources: Vec<EntityId> = Vec::new();
        for id in &req.from_entity_ids {
            if *id == req.to_entity_id {
                return Err(ValidationError::MergeSelf.into());
            }
            if !sources.contains(id) {
                sources.push(*id);
            }
        }
        if sources.is_empty() {
            return Err(ValidationError::MissingField {
                field: "from_entity_ids",
            }
            .into());
        }

        let mut all_ids = sources.clone();
        all_ids.push(req.to_entity_id);
        all_ids.sort_unstable_by(|a, b| a.as_uuid().cmp(b.as_uuid()));
        let _guards = self
            .entity_locks
            .lock_many(all_ids.iter().map(|id| id.as_uuid().as_bytes().as_slice()));
        let _groups = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut txn = self.db.begin_write();

        let dest_arc = txn
            .entity_by_id(req.to_entity_id)
            .ok_or(ValidationError::InvalidEntityId {
                id: req.to_entity_id,
            })?;
        let mut dest = (*dest_arc).clone();
        if dest.namespace_id != ns.id {
            return Err(ValidationError::NamespaceMismatch {
                kind: "entity to merge into",
            }
            .into());
        }

        // Validate every source against the destination before mutating
        // anything.
        let mut source_records: Vec<Entity> = Vec::with_capacity(sources.len());
        let mut accessors: BTreeSet<String> = dest
            .aliases
            .iter()
            .map(|a| a.mount_accessor.clone())
            .collect();
        for id in &sources {
            let from_arc = txn
                .entity_by_id(*id)
                .ok_or(ValidationError::InvalidEntityId { id: *id })?;
            let from = (*from_arc).clone();
            if from.namespace_id != dest.namespace_id {
                return Err(ValidationError::NamespaceMismatch {
                    kind: "entity to merge from",
                }
                .into());
            }
            for alias in &from.aliases {
                if !accessors.insert(alias.mount_accessor.clone()) {
                    return Err(ConsistencyError::MergeAccessorClash {
                        mount_accessor: alias.mount_accessor.clone(),
                    }
                    .into());
                }
            }
            for config_id in from.mfa_secrets.keys() {
                if dest.mfa_secrets.contains_key(config_id) && !req.force {
                    return Err(ConsistencyError::MfaSecretConflict {
                        config_id: config_id.clone(),
                    }
                    .into());
                }
            }
            source_records.push(from);
        }

        for mut from in source_records {
            // On a secret conflict the destination's value wins; only
            // reachable with force, the validation pass rejects otherwise.
            for (config_id, secret) in &from.mfa_secrets {
                if !dest.mfa_secrets.contains_key(config_id) {
                    dest.mfa_secrets.insert(config_id.clone(), secret.clone());
                }
            }

            if req.merge_policies {
                for policy in &from.policies {
                    if !dest.policies.contains(policy) {
                        dest.policies.push(policy.clone());
                    }
                }
            }

            for mut alias in std::mem::take(&mut from.aliases) {
                alias.merged_from_entity_ids.push(from.id);
                alias.entity_id = dest.id;
                dest.aliases.push(alias);
            }

            for merged in &from.merged_entity_ids {
                if !dest.merged_entity_ids.contains(merged) {
                    dest.merged_entity_ids.push(*merged);
                }
            }
            if !dest.merged_entity_ids.contains(&from.id) {
                dest.merged_entity_ids.push(from.id);
            }

            // Transfer group memberships; each touched group is rewritten
            // once with the source removed and the destination added.
            let memberships = txn.groups_by_member_entity(from.id);
            for group in memberships {
                let mut group = (*group).clone();
                group.member_entity_ids.retain(|m| *m != from.id);
                if !group.member_entity_ids.contains(&dest.id) {
                    group.member_entity_ids.push(dest.id);
                }
                self.upsert_group_in_txn(&mut txn, &mut group, true)?;
            }

            txn.delete_entity(from.id);
            self.entity_packer
                .delete_item(&from.bucket_key, &from.id.to_string())?;
        }

        dest.touch();
        txn.insert_entity(Arc::new(dest.clone()));
        self.persist_entity(&dest)?;
        txn.commit();
        Ok(())
    }

    /// Resolves a login credential to its entity, creating the entity and
    /// alias on first login.
    ///
    /// Returns the entity and whether this call created it. A disabled
    /// entity is returned as-is; denying its login is the caller's call.
    /// When `alias_metadata` is given and differs from the stored alias
    /// metadata, the stored copy is refreshed.
    ///
    /// # Errors
    ///
    /// Fails when the accessor does not resolve to a mount, the alias name
    /// is empty, or the durable write fails.
    pub fn create_or_fetch_entity(
        &self,
        ns: &Namespace,
        mount_accessor: &str,
        alias_name: &str,
        alias_metadata: Option<&BTreeMap<String, String>>,
    ) -> IdentityResult<(Entity, bool)> {
        if alias_name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        let mount = self.mounts.validate_accessor(mount_accessor).ok_or_else(|| {
            ValidationError::InvalidMountAccessor {
                accessor: mount_accessor.to_string(),
            }
        })?;

        // Fast path: the common login re-resolves an existing alias from a
        // committed snapshot without any locking.
        {
            let read = self.db.begin_read();
            if let Some(alias) = read.alias_by_factors(mount_accessor, alias_name) {
                if alias_metadata.map_or(true, |meta| *meta == alias.metadata) {
                    if let Some(entity) = read.entity_by_id(alias.entity_id) {
                        return Ok(((*entity).clone(), false));
                    }
                }
            }
        }

        // Serialize concurrent first logins for the same factors, so only
        // one of them creates the entity.
        let lock_key = format!("{mount_accessor}\u{0}{alias_name}");
        let _guard = self.factor_locks.lock_for(lock_key.as_bytes());

        let mut txn = self.db.begin_write();

        if let Some(found) = txn.alias_by_factors(mount_accessor, alias_name) {
            let owner_arc = txn.entity_by_id(found.entity_id).ok_or_else(|| {
                IdentityError::internal(format!(
                    "alias {} is bound to missing entity {}",
                    found.id, found.entity_id
                ))
            })?;
            let mut owner = (*owner_arc).clone();
            if let Some(meta) = alias_metadata {
                if found.metadata != *meta {
                    validate_metadata(meta)?;
                    if let Some(stored) = owner.alias_by_id_mut(found.id) {
                        stored.metadata = meta.clone();
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
            return Ok((owner, false));
        }

        let mut entity = Entity::new(String::new(), ns.id.clone());
        let mut alias = Alias::new(alias_name, entity.id, mount_accessor);
        alias.mount_type = mount.mount_type;
        alias.mount_path = mount.path;
        alias.local = mount.local;
        if let Some(meta) = alias_metadata {
            alias.metadata = meta.clone();
        }
        self.sanitize_alias(ns, &mut alias)?;
        entity.aliases.push(alias);

        self.sanitize_entity(&txn, ns, &mut entity)?;
        self.upsert_entity_in_txn(&mut txn, &mut entity, None, self.resolver.as_ref(), true)?;
        txn.commit();
        Ok((entity, true))
    }

    /// Looks up an entity by ID.
    ///
    /// IDs retired by a merge keep resolving, to the surviving entity.
    #[must_use]
    pub fn entity_by_id(&self, id: EntityId) -> Option<Arc<Entity>> {
        let read = self.db.begin_read();
        read.entity_by_id(id)
            .or_else(|| read.entity_by_merged_id(id))
    }

    /// Looks up an entity by name within a namespace.
    #[must_use]
    pub fn entity_by_name(&self, ns: &Namespace, name: &str) -> Option<Arc<Entity>> {
        self.db.begin_read().entity_by_name(&ns.id, name)
    }

    /// Entities in `ns` carrying the metadata pair, sorted by name.
    #[must_use]
    pub fn entities_by_metadata(
        &self,
        ns: &Namespace,
        key: &str,
        value: &str,
    ) -> Vec<Arc<Entity>> {
        let mut out: Vec<Arc<Entity>> = self
            .db
            .begin_read()
            .entities_by_metadata(key, value)
            .into_iter()
            .filter(|e| e.namespace_id == ns.id)
            .collect();
        out.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        out
    }

    /// All entities in a namespace, sorted by name.
    #[must_use]
    pub fn list_entities(&self, ns: &Namespace) -> Vec<Arc<Entity>> {
        let mut out = self.db.begin_read().entities_in_namespace(&ns.id);
        out.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
        });
        out
    }

    /// A read projection of one entity, or `None` when the ID does not
    /// resolve inside `ns`.
    #[must_use]
    pub fn entity_details(&self, ns: &Namespace, id: EntityId) -> Option<EntityDetails> {
        let read = self.db.begin_read();
        let entity = read
            .entity_by_id(id)
            .or_else(|| read.entity_by_merged_id(id))?;
        if entity.namespace_id != ns.id {
            return None;
        }

        let aliases = entity
            .aliases
            .iter()
            .map(|alias| {
                let mount = self.mounts.validate_accessor(&alias.mount_accessor);
                let (mount_type, mount_path) = match mount {
                    Some(info) => (info.mount_type, info.path),
                    None => (alias.mount_type.clone(), alias.mount_path.clone()),
                };
                AliasDetails {
                    id: alias.id,
                    name: alias.name.clone(),
                    mount_accessor: alias.mount_accessor.clone(),
                    mount_type,
                    mount_path,
                    local: alias.local,
                    metadata: alias.metadata.clone(),
                    creation_time: alias.creation_time,
                    last_update_time: alias.last_update_time,
                }
            })
            .collect();

        let (direct, inherited) = self.collect_group_memberships(&read, entity.id);

        Some(EntityDetails {
            id: entity.id,
            name: entity.name.clone(),
            namespace_id: entity.namespace_id.clone(),
            metadata: entity.metadata.clone(),
            policies: entity.policies.clone(),
            disabled: entity.disabled,
            aliases,
            merged_entity_ids: entity.merged_entity_ids.clone(),
            direct_group_ids: direct.iter().map(|g| g.id).collect(),
            inherited_group_ids: inherited.iter().map(|g| g.id).collect(),
            creation_time: entity.creation_time,
            last_update_time: entity.last_update_time,
        })
    }

    /// Writes an entity into the transaction's tables, persisting it when
    /// `persist` is set.
    ///
    /// Inline aliases are checked against the alias factor index first.
    /// A factor pair already bound to another live entity is a hard
    /// conflict on the live path; during a load (`persist` false) the
    /// earlier binding wins and the later alias is dropped, after the
    /// conflict strategy has ruled on it. When `previous` is given, the
    /// record it carried an alias over from is written first so both sides
    /// of the transfer land in the same commit.
    pub(crate) fn upsert_entity_in_txn(
        &self,
        txn: &mut WriteTxn<'_>,
        entity: &mut Entity,
        previous: Option<&Entity>,
        resolver: &dyn ConflictResolver,
        persist: bool,
    ) -> IdentityResult<()> {
        let incoming = std::mem::take(&mut entity.aliases);
        let mut kept: Vec<Alias> = Vec::with_capacity(incoming.len());
        let mut seen: Vec<(String, String)> = Vec::new();

        for mut alias in incoming {
            if alias.namespace_id.is_empty() {
                alias.namespace_id = entity.namespace_id.clone();
            }

            let found = txn.alias_by_factors(&alias.mount_accessor, &alias.name);
            match &found {
                None => {
                    if alias.namespace_id != entity.namespace_id {
                        return Err(ValidationError::NamespaceMismatch { kind: "alias" }.into());
                    }
                }
                Some(existing) if existing.entity_id == entity.id => {
                    if alias.namespace_id != entity.namespace_id {
                        return Err(ValidationError::NamespaceMismatch { kind: "alias" }.into());
                    }
                    // The same binding reasserted, possibly with a changed
                    // name case or metadata: keep the stored identity and
                    // merge history.
                    alias.id = existing.id;
                    alias.merged_from_entity_ids = existing.merged_from_entity_ids.clone();
                }
                Some(existing)
                    if previous.is_some_and(|p| {
                        p.id == existing.entity_id && p.alias_by_id(existing.id).is_none()
                    }) =>
                {
                    // The indexed owner is the previous record of this same
                    // operation and no longer carries the alias: a transfer
                    // is completing, and the index entry moves below.
                }
                Some(existing) => {
                    if persist {
                        return Err(ConsistencyError::AliasFactorsInUse {
                            mount_accessor: alias.mount_accessor.clone(),
                            name: alias.name.clone(),
                        }
                        .into());
                    }
                    if let Err(err) =
                        resolver.resolve_aliases(entity, Some(existing.as_ref()), &mut alias)
                    {
                        if !txn.case_sensitive() {
                            return Err(err);
                        }
                    }
                    tracing::warn!(
                        alias_id = %alias.id,
                        entity_id = %entity.id,
                        holding_entity_id = %existing.entity_id,
                        mount_accessor = %alias.mount_accessor,
                        "Alias factors already bound during load; keeping the earlier binding"
                    );
                    continue;
                }
            }

            let factor_key = (alias.mount_accessor.clone(), txn.name_key(&alias.name));
            let duplicate_within = seen.contains(&factor_key);

            // Consulted even without an index collision, so strategies
            // observe every alias that goes in.
            if let Err(err) = resolver.resolve_aliases(entity, found.as_deref(), &mut alias) {
                if duplicate_within && !txn.case_sensitive() {
                    return Err(err);
                }
            }

            if duplicate_within && !persist {
                tracing::warn!(
                    alias_id = %alias.id,
                    entity_id = %entity.id,
                    mount_accessor = %alias.mount_accessor,
                    "Duplicate alias factors within one entity during load; dropping the later alias"
                );
                continue;
            }

            seen.push(factor_key);
            alias.entity_id = entity.id;
            kept.push(alias);
        }
        entity.aliases = kept;

        if let Some(prev) = previous {
            txn.insert_entity(Arc::new(prev.clone()));
            if persist {
                self.persist_entity(prev)?;
            }
        }

        txn.insert_entity(Arc::new(entity.clone()));
        if persist {
            self.persist_entity(entity)?;
        }
        Ok(())
    }

    /// Fills generated and defaulted fields and validates the rest.
    ///
    /// An empty bucket key marks a record's first write: the key is
    /// derived from the ID, and the last-update timestamp is left at its
    /// creation value.
    pub(crate) fn sanitize_entity(
        &self,
        txn: &WriteTxn<'_>,
        ns: &Namespace,
        entity: &mut Entity,
    ) -> IdentityResult<()> {
        let first_write = entity.bucket_key.is_empty();
        if first_write {
            entity.bucket_key = bucket_key_for_id(&entity.id.to_string());
        }

        if entity.namespace_id.is_empty() {
            entity.namespace_id = ns.id.clone();
        }
        if entity.namespace_id != ns.id {
            return Err(ValidationError::NamespaceMismatch { kind: "entity" }.into());
        }

        if entity.name.is_empty() {
            let ns_id = entity.namespace_id.clone();
            entity.name = super::generate_name("entity", |candidate| {
                txn.entity_by_name(&ns_id, candidate).is_some()
            });
        }

        validate_metadata(&entity.metadata)?;

        if !first_write {
            entity.touch();
        }
        Ok(())
    }

    /// Rules on the entity's name against the current index: an exact
    /// taken name is rejected here, a case variant goes to the conflict
    /// strategy, and a free name is still announced to the strategy so
    /// reporting ones see every record.
    pub(crate) fn check_entity_name(
        &self,
        txn: &WriteTxn<'_>,
        entity: &mut Entity,
        resolver: &dyn ConflictResolver,
    ) -> IdentityResult<()> {
        let Some(existing) = txn.entity_by_name(&entity.namespace_id, &entity.name) else {
            return resolver.resolve_entities(None, entity);
        };
        if existing.id == entity.id {
            return Ok(());
        }
        if existing.name == entity.name {
            return Err(ValidationError::EntityNameInUse.into());
        }
        resolver.resolve_entities(Some(existing.as_ref()), entity)
    }

    pub(crate) fn persist_entity(&self, entity: &Entity) -> IdentityResult<()> {
        self.entity_packer
            .put_item(&entity.bucket_key, &entity.id.to_string(), entity)?;
        Ok(())
    }

    fn delete_entity_in_txn(&self, txn: &mut WriteTxn<'_>, entity: &Entity) -> IdentityResult<()> {
        self.remove_entity_from_groups(txn, entity.id)?;
        txn.delete_entity(entity.id);
        self.entity_packer
            .delete_item(&entity.bucket_key, &entity.id.to_string())?;
        Ok(())
    }

    fn remove_entity_from_groups(
        &self,
        txn: &mut WriteTxn<'_>,
        entity_id: EntityId,
    ) -> IdentityResult<()> {
        let memberships = txn.groups_by_member_entity(entity_id);
        for group in memberships {
            let mut group = (*group).clone();
            group.member_entity_ids.retain(|m| *m != entity_id);
            self.upsert_group_in_txn(txn, &mut group, true)?;
        }
        Ok(())
    }
}
