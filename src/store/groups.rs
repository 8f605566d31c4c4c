//! Group operations and the membership graph.
//!
//! Groups nest through `parent_group_ids` held on the member side: a
//! subgroup points up at the groups it belongs to. Graph walks treat a
//! dangling parent ID as an absent edge, so deleting a group never has to
//! chase down and rewrite its subgroups.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictResolver;
use crate::entity::EntityId;
use crate::error::{ConsistencyError, IdentityResult, ValidationError};
use crate::group::{Group, GroupId, MAX_MEMBER_ENTITY_IDS};
use crate::memdb::{DbState, WriteTxn};
use crate::metadata::validate_metadata;
use crate::namespace::{Namespace, NamespaceId};
use crate::storage::bucket::bucket_key_for_id;

use super::IdentityStore;

/// A create-or-update request for a group.
///
/// Addressing works like an entity update: by `id`, by `name` (creating
/// when the name is free), or with neither to create under a generated
/// name. Fields left `None` keep their current values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRequest {
    /// Target group ID.
    pub id: Option<GroupId>,
    /// Target (or new) group name.
    pub name: Option<String>,
    /// Replacement policy list.
    pub policies: Option<Vec<String>>,
    /// Replacement metadata map.
    pub metadata: Option<BTreeMap<String, String>>,
    /// Replacement member entity list.
    pub member_entity_ids: Option<Vec<EntityId>>,
    /// Replacement subgroup list. `None` leaves existing subgroup links
    /// untouched; `Some` replaces them, unlinking members no longer named.
    pub member_group_ids: Option<Vec<GroupId>>,
}

/// What a group write resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct GroupUpdateOutcome {
    /// ID of the written group.
    pub id: GroupId,
    /// Final name, which may have been generated.
    pub name: String,
    /// True when the write created the group.
    pub created: bool,
}

impl IdentityStore {
    /// Creates or updates a group from the fields of `req`.
    ///
    /// # Errors
    ///
    /// Fails when the request addresses a missing ID, renames onto a
    /// taken name, carries the `root` policy, lists an unknown member
    /// entity or group, would close a membership cycle, or the durable
    /// write fails.
    pub fn update_group(
        &self,
        ns: &Namespace,
        req: GroupRequest,
    ) -> IdentityResult<GroupUpdateOutcome> {
        let _lock = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = self.db.begin_write();

        let mut target: Option<Arc<Group>> = None;
        if let Some(id) = req.id {
            target = Some(
                txn.group_by_id(id)
                    .ok_or(ValidationError::InvalidGroupId { id })?,
            );
        }
        if let Some(name) = req.name.as_deref() {
            if let Some(by_name) = txn.group_by_name(&ns.id, name) {
                match &target {
                    None => target = Some(by_name),
                    Some(t) if t.id == by_name.id => {}
                    Some(_) if by_name.name == name => {
                        return Err(ValidationError::GroupNameInUse.into());
                    }
                    // A case variant of another group's name; the active
                    // strategy rules on it below.
                    Some(_) => {}
                }
            }
        }

        let created = target.is_none();
        let mut group = match target {
            Some(arc) => (*arc).clone(),
            None => Group::new(String::new(), ns.id.clone()),
        };

        if let Some(name) = req.name {
            group.name = name;
        }
        if let Some(policies) = req.policies {
            group.policies = super::normalize_policies(policies);
        }
        if group.policies.iter().any(|p| p == "root") {
            return Err(ValidationError::RootPolicy.into());
        }
        if let Some(metadata) = req.metadata {
            group.metadata = metadata;
        }
        if let Some(members) = req.member_entity_ids {
            group.member_entity_ids = members;
        }

        if !group.name.is_empty() {
            self.check_group_name(&txn, &mut group, self.resolver.as_ref())?;
        }
        self.sanitize_and_upsert_group(&mut txn, ns, &mut group, req.member_group_ids)?;
        txn.commit();

        Ok(GroupUpdateOutcome {
            id: group.id,
            name: group.name,
            created,
        })
    }

    /// Deletes a group. Its subgroups keep their (now dangling) parent
    /// link; graph walks skip it. Deleting an absent ID is a no-op.
    ///
    /// # Errors
    ///
    /// Fails when the durable write fails.
    pub fn delete_group_by_id(&self, id: GroupId) -> IdentityResult<()> {
        let _lock = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = self.db.begin_write();
        let Some(group) = txn.group_by_id(id) else {
            return Ok(());
        };
        self.delete_group_in_txn(&mut txn, &group)?;
        txn.commit();
        Ok(())
    }

    /// Deletes the group holding `name`, if any.
    ///
    /// # Errors
    ///
    /// Fails when the durable write fails.
    pub fn delete_group_by_name(&self, ns: &Namespace, name: &str) -> IdentityResult<()> {
        let _lock = self.group_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = self.db.begin_write();
        let Some(group) = txn.group_by_name(&ns.id, name) else {
            return Ok(());
        };
        self.delete_group_in_txn(&mut txn, &group)?;
        txn.commit();
        Ok(())
    }

    /// Looks up a group by ID.
    #[must_use]
    pub fn group_by_id(&self, id: GroupId) -> Option<Arc<Group>> {
        self.db.begin_read().group_by_id(id)
    }

    /// Looks up a group by name within a namespace.
    #[must_use]
    pub fn group_by_name(&self, ns: &Namespace, name: &str) -> Option<Arc<Group>> {
        self.db.begin_read().group_by_name(&ns.id, name)
    }

    /// All groups in a namespace, sorted by name.
    #[must_use]
    pub fn list_groups(&self, ns: &Namespace) -> Vec<Arc<Group>> {
        let mut out = self.db.begin_read().groups_in_namespace(&ns.id);
        sort_groups(&mut out);
        out
    }

    /// IDs of the direct subgroups of a group, in name order.
    #[must_use]
    pub fn member_group_ids(&self, id: GroupId) -> Vec<GroupId> {
        let mut members = self.db.begin_read().groups_by_parent(id);
        sort_groups(&mut members);
        members.iter().map(|g| g.id).collect()
    }

    /// Groups in `ns` carrying `policy` directly, sorted by name.
    #[must_use]
    pub fn groups_by_policy(&self, ns: &Namespace, policy: &str) -> Vec<Arc<Group>> {
        let mut out: Vec<Arc<Group>> = self
            .db
            .begin_read()
            .groups_by_policy(policy)
            .into_iter()
            .filter(|g| g.namespace_id == ns.id)
            .collect();
        sort_groups(&mut out);
        out
    }

    /// Groups the entity belongs to, as `(direct, inherited)`: groups
    /// listing it as a member, and groups reached only through nesting.
    /// Both halves are sorted by name.
    #[must_use]
    pub fn groups_by_entity(&self, entity_id: EntityId) -> (Vec<Arc<Group>>, Vec<Arc<Group>>) {
        let read = self.db.begin_read();
        self.collect_group_memberships(&read, entity_id)
    }

    /// Policies the entity holds through group membership, keyed by the
    /// namespace of the granting group, deduplicated and sorted.
    ///
    /// Walks upward from each direct membership through nested groups.
    /// Dangling parent links are skipped.
    #[must_use]
    pub fn group_policies_by_entity(
        &self,
        entity_id: EntityId,
    ) -> BTreeMap<NamespaceId, Vec<String>> {
        let read = self.db.begin_read();
        let mut visited: HashSet<GroupId> = HashSet::new();
        let mut acc: BTreeMap<NamespaceId, BTreeSet<String>> = BTreeMap::new();
        for group in read.groups_by_member_entity(entity_id) {
            collect_policies(&read, &group, &mut visited, &mut acc);
        }
        acc.into_iter()
            .map(|(ns, set)| (ns, set.into_iter().collect()))
            .collect()
    }

    pub(crate) fn collect_group_memberships(
        &self,
        state: &DbState,
        entity_id: EntityId,
    ) -> (Vec<Arc<Group>>, Vec<Arc<Group>>) {
        let mut direct = state.groups_by_member_entity(entity_id);
        let mut visited: HashSet<GroupId> = HashSet::new();
        let mut all: Vec<Arc<Group>> = Vec::new();
        for group in &direct {
            collect_ancestors(state, Arc::clone(group), &mut visited, &mut all);
        }

        let direct_ids: HashSet<GroupId> = direct.iter().map(|g| g.id).collect();
        let mut inherited: Vec<Arc<Group>> = all
            .into_iter()
            .filter(|g| !direct_ids.contains(&g.id))
            .collect();
        sort_groups(&mut direct);
        sort_groups(&mut inherited);
        (direct, inherited)
    }

    /// Fills generated and defaulted fields, validates members, applies
    /// subgroup links, and writes the group through the transaction.
    pub(crate) fn sanitize_and_upsert_group(
        &self,
        txn: &mut WriteTxn<'_>,
        ns: &Namespace,
        group: &mut Group,
        member_group_ids: Option<Vec<GroupId>>,
    ) -> IdentityResult<()> {
        let first_write = group.bucket_key.is_empty();
        if first_write {
            group.bucket_key = bucket_key_for_id(&group.id.to_string());
        }

        if group.namespace_id.is_empty() {
            group.namespace_id = ns.id.clone();
        }
        if group.namespace_id != ns.id {
            return Err(ValidationError::NamespaceMismatch { kind: "group" }.into());
        }

        if group.name.is_empty() {
            let ns_id = group.namespace_id.clone();
            group.name = super::generate_name("group", |candidate| {
                txn.group_by_name(&ns_id, candidate).is_some()
            });
        }

        validate_metadata(&group.metadata)?;
        group.policies = super::normalize_policies(std::mem::take(&mut group.policies));

        if !group.member_entity_ids.is_empty() {
            let mut deduped: Vec<EntityId> = Vec::with_capacity(group.member_entity_ids.len());
            for id in &group.member_entity_ids {
                if !deduped.contains(id) {
                    deduped.push(*id);
                }
            }
            if deduped.len() > MAX_MEMBER_ENTITY_IDS {
                return Err(ValidationError::TooManyMemberEntities {
                    max: MAX_MEMBER_ENTITY_IDS,
                }
                .into());
            }
            for id in &deduped {
                if txn.entity_by_id(*id).is_none() {
                    return Err(ValidationError::InvalidMemberEntity { id: *id }.into());
                }
            }
            group.member_entity_ids = deduped;
        }

        if !first_write {
            group.touch();
        }

        if let Some(member_ids) = member_group_ids {
            self.apply_member_groups(txn, group, member_ids)?;
        }

        self.upsert_group_in_txn(txn, group, true)
    }

    /// Writes a group into the transaction's tables, bumping its modify
    /// index, and persists it when `persist` is set.
    pub(crate) fn upsert_group_in_txn(
        &self,
        txn: &mut WriteTxn<'_>,
        group: &mut Group,
        persist: bool,
    ) -> IdentityResult<()> {
        group.modify_index += 1;
        txn.insert_group(Arc::new(group.clone()));
        if persist {
            self.persist_group(group)?;
        }
        Ok(())
    }

    pub(crate) fn persist_group(&self, group: &Group) -> IdentityResult<()> {
        self.group_packer
            .put_item(&group.bucket_key, &group.id.to_string(), group)?;
        Ok(())
    }

    /// Replaces the group's subgroup links with `member_ids`: members no
    /// longer named are unlinked, new members are checked and linked.
    fn apply_member_groups(
        &self,
        txn: &mut WriteTxn<'_>,
        group: &Group,
        member_ids: Vec<GroupId>,
    ) -> IdentityResult<()> {
        let mut deduped: Vec<GroupId> = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            if !deduped.contains(&id) {
                deduped.push(id);
            }
        }

        let current = txn.groups_by_parent(group.id);
        for member in current {
            if deduped.contains(&member.id) {
                continue;
            }
            let mut member = (*member).clone();
            member.parent_group_ids.retain(|p| *p != group.id);
            self.upsert_group_in_txn(txn, &mut member, true)?;
        }

        let group_exists = txn.group_by_id(group.id).is_some();
        for member_id in deduped {
            let member_arc = txn
                .group_by_id(member_id)
                .ok_or(ValidationError::InvalidMemberGroup { id: member_id })?;
            if member_arc.parent_group_ids.contains(&group.id) {
                continue;
            }
            if member_id == group.id {
                return Err(ConsistencyError::SelfMembership { group_id: member_id }.into());
            }
            // Linking a subtree that reaches back to this group would
            // close a membership loop. A group not yet in the tables has
            // no subtree to reach back from.
            if group_exists {
                let mut probe: HashSet<GroupId> = HashSet::new();
                if detect_cycle(&*txn, group.id, member_id, &mut probe) {
                    return Err(ConsistencyError::CycleDetected {
                        group_id: member_id,
                    }
                    .into());
                }
            }
            let mut member = (*member_arc).clone();
            member.parent_group_ids.push(group.id);
            self.upsert_group_in_txn(txn, &mut member, true)?;
        }
        Ok(())
    }

    /// Rules on the group's name against the current index, mirroring
    /// the entity name check.
    pub(crate) fn check_group_name(
        &self,
        txn: &WriteTxn<'_>,
        group: &mut Group,
        resolver: &dyn ConflictResolver,
    ) -> IdentityResult<()> {
        let Some(existing) = txn.group_by_name(&group.namespace_id, &group.name) else {
            return resolver.resolve_groups(None, group);
        };
        if existing.id == group.id {
            return Ok(());
        }
        if existing.name == group.name {
            return Err(ValidationError::GroupNameInUse.into());
        }
        resolver.resolve_groups(Some(existing.as_ref()), group)
    }

    fn delete_group_in_txn(&self, txn: &mut WriteTxn<'_>, group: &Group) -> IdentityResult<()> {
        txn.delete_group(group.id);
        self.group_packer
            .delete_item(&group.bucket_key, &group.id.to_string())?;
        Ok(())
    }
}

/// True when `target` is reachable from `from` by walking membership
/// edges downward (from a group to its subgroups).
fn detect_cycle(
    state: &DbState,
    target: GroupId,
    from: GroupId,
    visited: &mut HashSet<GroupId>,
) -> bool {
    if from == target {
        return true;
    }
    if !visited.insert(from) {
        return false;
    }
    for child in state.groups_by_parent(from) {
        if detect_cycle(state, target, child.id, visited) {
            return true;
        }
    }
    false
}

fn collect_ancestors(
    state: &DbState,
    group: Arc<Group>,
    visited: &mut HashSet<GroupId>,
    acc: &mut Vec<Arc<Group>>,
) {
    if !visited.insert(group.id) {
        return;
    }
    for parent_id in &group.parent_group_ids {
        if let Some(parent) = state.group_by_id(*parent_id) {
            collect_ancestors(state, parent, visited, acc);
        }
    }
    acc.push(group);
}

fn collect_policies(
    state: &DbState,
    group: &Group,
    visited: &mut HashSet<GroupId>,
    acc: &mut BTreeMap<NamespaceId, BTreeSet<String>>,
) {
    if !visited.insert(group.id) {
        return;
    }
    if !group.policies.is_empty() {
        acc.entry(group.namespace_id.clone())
            .or_default()
            .extend(group.policies.iter().cloned());
    }
    for parent_id in &group.parent_group_ids {
        // A parent deleted out from under the link is an absent edge.
        if let Some(parent) = state.group_by_id(*parent_id) {
            collect_policies(state, &parent, visited, acc);
        }
    }
}

fn sort_groups(groups: &mut [Arc<Group>]) {
    groups.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::mount::StaticMounts;
    use crate::namespace::StaticNamespaces;
    use crate::storage::InMemStorage;
    use crate::store::IdentityConfig;

    fn test_store() -> IdentityStore {
        IdentityStore::new(
            Arc::new(InMemStorage::new()),
            Arc::new(StaticNamespaces::new()),
            Arc::new(StaticMounts::new()),
            IdentityConfig::default(),
        )
        .unwrap()
    }

    fn root() -> Namespace {
        Namespace::root()
    }

    fn named(name: &str) -> GroupRequest {
        GroupRequest {
            name: Some(name.to_string()),
            ..GroupRequest::default()
        }
    }

    #[test]
    fn test_create_group() {
        let store = test_store();
        let outcome = store.update_group(&root(), named("engineering")).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.name, "engineering");

        let group = store.group_by_id(outcome.id).unwrap();
        assert_eq!(group.modify_index, 1);
        assert!(!group.bucket_key.is_empty());

        // Durable copy exists.
        let stored: Group = store
            .group_packer
            .get_item(&group.bucket_key, &group.id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "engineering");
    }

    #[test]
    fn test_create_group_generates_name() {
        let store = test_store();
        let outcome = store
            .update_group(&root(), GroupRequest::default())
            .unwrap();
        assert!(outcome.name.starts_with("group_"));
    }

    #[test]
    fn test_group_name_addressing_folds_case() {
        let store = test_store();
        store.update_group(&root(), named("Ops")).unwrap();

        // Same name addresses the same group: an update, not a conflict.
        let exact = store.update_group(&root(), named("Ops"));
        assert!(!exact.unwrap().created);

        // A case variant addresses the same folded key, so it renames the
        // stored group rather than creating a second one.
        let variant = store.update_group(&root(), named("ops")).unwrap();
        assert!(!variant.created);
        assert_eq!(store.group_count(), 1);
        assert_eq!(store.group_by_id(variant.id).unwrap().name, "ops");
    }

    #[test]
    fn test_rename_group_to_taken_name() {
        let store = test_store();
        store.update_group(&root(), named("alpha")).unwrap();
        let beta = store.update_group(&root(), named("beta")).unwrap();

        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(beta.id),
                    name: Some("alpha".to_string()),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_rename_group_to_case_variant_rejected() {
        let store = test_store();
        store.update_group(&root(), named("Alpha")).unwrap();
        let beta = store.update_group(&root(), named("beta")).unwrap();

        // Renaming a different group onto a case variant of a taken name
        // goes to the conflict strategy, and the default one rejects it.
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(beta.id),
                    name: Some("alpha".to_string()),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_duplicate_name());
    }

    #[test]
    fn test_group_root_policy_rejected() {
        let store = test_store();
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    policies: Some(vec!["root".to_string()]),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_member_entities_must_exist() {
        let store = test_store();
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    member_entity_ids: Some(vec![EntityId::new()]),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_member_entities_deduped() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();
        let outcome = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    member_entity_ids: Some(vec![entity.id, entity.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        let group = store.group_by_id(outcome.id).unwrap();
        assert_eq!(group.member_entity_ids, vec![entity.id]);
    }

    #[test]
    fn test_member_entity_limit() {
        let store = test_store();
        let too_many: Vec<EntityId> = (0..=MAX_MEMBER_ENTITY_IDS).map(|_| EntityId::new()).collect();
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    member_entity_ids: Some(too_many),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_member_group_linking() {
        let store = test_store();
        let child = store.update_group(&root(), named("child")).unwrap();
        let parent = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("parent".to_string()),
                    member_group_ids: Some(vec![child.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        assert_eq!(store.member_group_ids(parent.id), vec![child.id]);
        let child_record = store.group_by_id(child.id).unwrap();
        assert_eq!(child_record.parent_group_ids, vec![parent.id]);
    }

    #[test]
    fn test_member_group_unlinking() {
        let store = test_store();
        let child = store.update_group(&root(), named("child")).unwrap();
        let parent = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("parent".to_string()),
                    member_group_ids: Some(vec![child.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        // Replacing the member list with an empty one unlinks the child.
        store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(parent.id),
                    member_group_ids: Some(vec![]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        assert!(store.member_group_ids(parent.id).is_empty());
        assert!(store
            .group_by_id(child.id)
            .unwrap()
            .parent_group_ids
            .is_empty());

        // Leaving the member list out keeps links as they are.
        store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(parent.id),
                    policies: Some(vec!["reader".to_string()]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        assert!(store.member_group_ids(parent.id).is_empty());
    }

    #[test]
    fn test_self_membership_rejected() {
        let store = test_store();
        let group = store.update_group(&root(), named("ops")).unwrap();
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(group.id),
                    member_group_ids: Some(vec![group.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_consistency());
    }

    #[test]
    fn test_membership_cycle_rejected() {
        let store = test_store();
        let a = store.update_group(&root(), named("a")).unwrap();
        let b = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("b".to_string()),
                    member_group_ids: Some(vec![a.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        // a is a member of b; making b a member of a closes a loop.
        let err = store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(a.id),
                    member_group_ids: Some(vec![b.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap_err();
        assert!(err.is_consistency());
    }

    #[test]
    fn test_group_policies_by_entity() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();

        let child = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("child".to_string()),
                    policies: Some(vec!["deploy".to_string()]),
                    member_entity_ids: Some(vec![entity.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("parent".to_string()),
                    policies: Some(vec!["audit".to_string(), "deploy".to_string()]),
                    member_group_ids: Some(vec![child.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        let policies = store.group_policies_by_entity(entity.id);
        assert_eq!(
            policies[&NamespaceId::root()],
            vec!["audit".to_string(), "deploy".to_string()]
        );
    }

    #[test]
    fn test_groups_by_entity_direct_and_inherited() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();

        let team = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("team".to_string()),
                    member_entity_ids: Some(vec![entity.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        let org = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("org".to_string()),
                    member_group_ids: Some(vec![team.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        let (direct, inherited) = store.groups_by_entity(entity.id);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].id, team.id);
        assert_eq!(inherited.len(), 1);
        assert_eq!(inherited[0].id, org.id);
    }

    #[test]
    fn test_delete_group() {
        let store = test_store();
        let outcome = store.update_group(&root(), named("ops")).unwrap();
        let group = store.group_by_id(outcome.id).unwrap();

        store.delete_group_by_id(group.id).unwrap();
        assert!(store.group_by_id(group.id).is_none());
        let gone = store
            .group_packer
            .get_item(&group.bucket_key, &group.id.to_string())
            .unwrap();
        assert!(gone.is_none());

        // Absent ID is a no-op.
        store.delete_group_by_id(group.id).unwrap();
    }

    #[test]
    fn test_deleted_parent_is_skipped_in_walks() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();
        let team = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("team".to_string()),
                    member_entity_ids: Some(vec![entity.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        let org = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("org".to_string()),
                    policies: Some(vec!["audit".to_string()]),
                    member_group_ids: Some(vec![team.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        store.delete_group_by_id(org.id).unwrap();

        // The team still records the dangling parent; walks ignore it.
        let team_record = store.group_by_id(team.id).unwrap();
        assert_eq!(team_record.parent_group_ids, vec![org.id]);
        let policies = store.group_policies_by_entity(entity.id);
        assert!(policies.is_empty());
        let (_, inherited) = store.groups_by_entity(entity.id);
        assert!(inherited.is_empty());
    }

    #[test]
    fn test_entity_delete_scrubs_memberships() {
        let store = test_store();
        let entity = store
            .create_entity(&root(), Entity::new("alice", NamespaceId::root()))
            .unwrap();
        let group = store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    member_entity_ids: Some(vec![entity.id]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();

        store.delete_entity_by_id(entity.id).unwrap();

        let record = store.group_by_id(group.id).unwrap();
        assert!(record.member_entity_ids.is_empty());
        // The scrub reached durable storage too.
        let stored: Group = store
            .group_packer
            .get_item(&record.bucket_key, &record.id.to_string())
            .unwrap()
            .unwrap();
        assert!(stored.member_entity_ids.is_empty());
    }

    #[test]
    fn test_modify_index_increments() {
        let store = test_store();
        let outcome = store.update_group(&root(), named("ops")).unwrap();
        assert_eq!(store.group_by_id(outcome.id).unwrap().modify_index, 1);

        store
            .update_group(
                &root(),
                GroupRequest {
                    id: Some(outcome.id),
                    policies: Some(vec!["reader".to_string()]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        assert_eq!(store.group_by_id(outcome.id).unwrap().modify_index, 2);
    }

    #[test]
    fn test_groups_by_policy() {
        let store = test_store();
        store
            .update_group(
                &root(),
                GroupRequest {
                    name: Some("ops".to_string()),
                    policies: Some(vec!["deploy".to_string()]),
                    ..GroupRequest::default()
                },
            )
            .unwrap();
        store.update_group(&root(), named("idle")).unwrap();

        let matches = store.groups_by_policy(&root(), "deploy");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "ops");
    }
}
