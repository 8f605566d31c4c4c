//! Table state and secondary index maintenance.
//!
//! One [`DbState`] value holds every table and index. Records are stored
//! behind `Arc`, so cloning the whole state for a write transaction copies
//! index maps but shares record payloads.
//!
//! Name and alias-factor indexes are unique with last-write-wins semantics:
//! inserting a record whose key is already bound rebinds the key, and the
//! earlier record stays reachable by ID only. Removal unbinds a key only if
//! it still points at the record being removed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::alias::{Alias, AliasId};
use crate::entity::{Entity, EntityId};
use crate::group::{Group, GroupId};
use crate::namespace::NamespaceId;

/// Key of the per-namespace name indexes.
type NameKey = (NamespaceId, String);

/// Key of the alias factor index: (mount accessor, folded alias name).
type FactorKey = (String, String);

/// The complete in-memory image of the store.
#[derive(Debug, Clone, Default)]
pub(crate) struct DbState {
    case_sensitive: bool,

    entities: HashMap<EntityId, Arc<Entity>>,
    entities_by_name: HashMap<NameKey, EntityId>,
    entities_by_bucket: HashMap<String, HashSet<EntityId>>,
    merged_entities: HashMap<EntityId, EntityId>,

    aliases: HashMap<AliasId, Arc<Alias>>,
    aliases_by_factors: HashMap<FactorKey, AliasId>,

    groups: HashMap<GroupId, Arc<Group>>,
    groups_by_name: HashMap<NameKey, GroupId>,
    groups_by_parent: HashMap<GroupId, HashSet<GroupId>>,
    groups_by_member_entity: HashMap<EntityId, HashSet<GroupId>>,
    groups_by_policy: HashMap<String, HashSet<GroupId>>,
    groups_by_bucket: HashMap<String, HashSet<GroupId>>,
}

impl DbState {
    pub(crate) fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..Self::default()
        }
    }

    /// Whether name and factor keys are matched byte-for-byte.
    pub(crate) fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Index form of a name: folded to lowercase unless the state is
    /// case-sensitive.
    pub(crate) fn name_key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    // ---- entity lookups ----

    pub(crate) fn entity_by_id(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities.get(&id).cloned()
    }

    pub(crate) fn entity_by_name(&self, ns: &NamespaceId, name: &str) -> Option<Arc<Entity>> {
        let key = (ns.clone(), self.name_key(name));
        let id = self.entities_by_name.get(&key)?;
        self.entities.get(id).cloned()
    }

    /// Resolves an ID that was retired by a merge to the surviving entity.
    pub(crate) fn entity_by_merged_id(&self, id: EntityId) -> Option<Arc<Entity>> {
        let live = self.merged_entities.get(&id)?;
        self.entities.get(live).cloned()
    }

    pub(crate) fn entities_by_bucket(&self, bucket_key: &str) -> Vec<Arc<Entity>> {
        self.entities_by_bucket
            .get(bucket_key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect()
    }

    pub(crate) fn entities_by_metadata(&self, key: &str, value: &str) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| e.metadata.get(key).is_some_and(|v| v == value))
            .cloned()
            .collect()
    }

    pub(crate) fn entities_in_namespace(&self, ns: &NamespaceId) -> Vec<Arc<Entity>> {
        self.entities
            .values()
            .filter(|e| &e.namespace_id == ns)
            .cloned()
            .collect()
    }

    pub(crate) fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ---- alias lookups ----

    pub(crate) fn alias_by_id(&self, id: AliasId) -> Option<Arc<Alias>> {
        self.aliases.get(&id).cloned()
    }

    pub(crate) fn alias_by_factors(&self, mount_accessor: &str, name: &str) -> Option<Arc<Alias>> {
        let key = (mount_accessor.to_string(), self.name_key(name));
        let id = self.aliases_by_factors.get(&key)?;
        self.aliases.get(id).cloned()
    }

    pub(crate) fn aliases_in_namespace(&self, ns: &NamespaceId) -> Vec<Arc<Alias>> {
        self.aliases
            .values()
            .filter(|a| &a.namespace_id == ns)
            .cloned()
            .collect()
    }

    // ---- group lookups ----

    pub(crate) fn group_by_id(&self, id: GroupId) -> Option<Arc<Group>> {
        self.groups.get(&id).cloned()
    }

    pub(crate) fn group_by_name(&self, ns: &NamespaceId, name: &str) -> Option<Arc<Group>> {
        let key = (ns.clone(), self.name_key(name));
        let id = self.groups_by_name.get(&key)?;
        self.groups.get(id).cloned()
    }

    /// Groups that are direct members of `parent` (their `parent_group_ids`
    /// contains `parent`).
    pub(crate) fn groups_by_parent(&self, parent: GroupId) -> Vec<Arc<Group>> {
        self.groups_by_parent
            .get(&parent)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id).cloned())
            .collect()
    }

    pub(crate) fn groups_by_member_entity(&self, entity_id: EntityId) -> Vec<Arc<Group>> {
        self.groups_by_member_entity
            .get(&entity_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id).cloned())
            .collect()
    }

    pub(crate) fn groups_by_policy(&self, policy: &str) -> Vec<Arc<Group>> {
        self.groups_by_policy
            .get(policy)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id).cloned())
            .collect()
    }

    pub(crate) fn groups_by_bucket(&self, bucket_key: &str) -> Vec<Arc<Group>> {
        self.groups_by_bucket
            .get(bucket_key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id).cloned())
            .collect()
    }

    pub(crate) fn groups_by_metadata(&self, key: &str, value: &str) -> Vec<Arc<Group>> {
        self.groups
            .values()
            .filter(|g| g.metadata.get(key).is_some_and(|v| v == value))
            .cloned()
            .collect()
    }

    pub(crate) fn groups_in_namespace(&self, ns: &NamespaceId) -> Vec<Arc<Group>> {
        self.groups
            .values()
            .filter(|g| &g.namespace_id == ns)
            .cloned()
            .collect()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ---- entity mutation ----

    /// Inserts an entity, replacing any previous version with the same ID
    /// and refreshing every index, including the inline alias mirror.
    pub(crate) fn insert_entity(&mut self, entity: Arc<Entity>) {
        if let Some(old) = self.entities.get(&entity.id).cloned() {
            self.unindex_entity(&old);
        }

        let name_key = (entity.namespace_id.clone(), self.name_key(&entity.name));
        self.entities_by_name.insert(name_key, entity.id);

        for alias in &entity.aliases {
            let factor_key = (alias.mount_accessor.clone(), self.name_key(&alias.name));
            self.aliases.insert(alias.id, Arc::new(alias.clone()));
            self.aliases_by_factors.insert(factor_key, alias.id);
        }

        if !entity.bucket_key.is_empty() {
            self.entities_by_bucket
                .entry(entity.bucket_key.clone())
                .or_default()
                .insert(entity.id);
        }

        for merged in &entity.merged_entity_ids {
            self.merged_entities.insert(*merged, entity.id);
        }

        self.entities.insert(entity.id, entity);
    }

    /// Deletes an entity and its index entries. Returns the removed record.
    pub(crate) fn delete_entity(&mut self, id: EntityId) -> Option<Arc<Entity>> {
        let old = self.entities.get(&id).cloned()?;
        self.unindex_entity(&old);
        self.entities.remove(&id);
        Some(old)
    }

    fn unindex_entity(&mut self, old: &Entity) {
        let name_key = (old.namespace_id.clone(), self.name_key(&old.name));
        if self.entities_by_name.get(&name_key) == Some(&old.id) {
            self.entities_by_name.remove(&name_key);
        }

        for alias in &old.aliases {
            // The mirror entry may already belong to another entity when an
            // alias was transferred within the same transaction.
            let owned = self
                .aliases
                .get(&alias.id)
                .is_some_and(|mirror| mirror.entity_id == old.id);
            if owned {
                self.aliases.remove(&alias.id);
                let factor_key = (alias.mount_accessor.clone(), self.name_key(&alias.name));
                if self.aliases_by_factors.get(&factor_key) == Some(&alias.id) {
                    self.aliases_by_factors.remove(&factor_key);
                }
            }
        }

        if let Some(set) = self.entities_by_bucket.get_mut(&old.bucket_key) {
            set.remove(&old.id);
            if set.is_empty() {
                self.entities_by_bucket.remove(&old.bucket_key);
            }
        }

        for merged in &old.merged_entity_ids {
            if self.merged_entities.get(merged) == Some(&old.id) {
                self.merged_entities.remove(merged);
            }
        }
    }

    // ---- group mutation ----

    pub(crate) fn insert_group(&mut self, group: Arc<Group>) {
        if let Some(old) = self.groups.get(&group.id).cloned() {
            self.unindex_group(&old);
        }

        let name_key = (group.namespace_id.clone(), self.name_key(&group.name));
        self.groups_by_name.insert(name_key, group.id);

        for parent in &group.parent_group_ids {
            self.groups_by_parent
                .entry(*parent)
                .or_default()
                .insert(group.id);
        }

        for member in &group.member_entity_ids {
            self.groups_by_member_entity
                .entry(*member)
                .or_default()
                .insert(group.id);
        }

        for policy in &group.policies {
            self.groups_by_policy
                .entry(policy.clone())
                .or_default()
                .insert(group.id);
        }

        if !group.bucket_key.is_empty() {
            self.groups_by_bucket
                .entry(group.bucket_key.clone())
                .or_default()
                .insert(group.id);
        }

        self.groups.insert(group.id, group);
    }

    pub(crate) fn delete_group(&mut self, id: GroupId) -> Option<Arc<Group>> {
        let old = self.groups.get(&id).cloned()?;
        self.unindex_group(&old);
        self.groups.remove(&id);
        Some(old)
    }

    fn unindex_group(&mut self, old: &Group) {
        let name_key = (old.namespace_id.clone(), self.name_key(&old.name));
        if self.groups_by_name.get(&name_key) == Some(&old.id) {
            self.groups_by_name.remove(&name_key);
        }

        for parent in &old.parent_group_ids {
            if let Some(set) = self.groups_by_parent.get_mut(parent) {
                set.remove(&old.id);
                if set.is_empty() {
                    self.groups_by_parent.remove(parent);
                }
            }
        }

        for member in &old.member_entity_ids {
            if let Some(set) = self.groups_by_member_entity.get_mut(member) {
                set.remove(&old.id);
                if set.is_empty() {
                    self.groups_by_member_entity.remove(member);
                }
            }
        }

        for policy in &old.policies {
            if let Some(set) = self.groups_by_policy.get_mut(policy) {
                set.remove(&old.id);
                if set.is_empty() {
                    self.groups_by_policy.remove(policy);
                }
            }
        }

        if let Some(set) = self.groups_by_bucket.get_mut(&old.bucket_key) {
            set.remove(&old.id);
            if set.is_empty() {
                self.groups_by_bucket.remove(&old.bucket_key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Entity {
        let mut e = Entity::new(name, NamespaceId::root());
        e.bucket_key = "ab".to_string();
        e
    }

    fn entity_with_alias(name: &str, alias_name: &str, accessor: &str) -> Entity {
        let mut e = entity(name);
        let mut alias = Alias::new(alias_name, e.id, accessor);
        alias.namespace_id = NamespaceId::root();
        e.aliases.push(alias);
        e
    }

    #[test]
    fn test_entity_indexes() {
        let mut db = DbState::new(false);
        let e = entity_with_alias("alice", "alice", "auth_up_1");
        let id = e.id;
        let alias_id = e.aliases[0].id;
        db.insert_entity(Arc::new(e));

        assert_eq!(db.entity_by_id(id).unwrap().id, id);
        assert_eq!(db.entity_by_name(&NamespaceId::root(), "alice").unwrap().id, id);
        assert_eq!(db.alias_by_id(alias_id).unwrap().entity_id, id);
        assert_eq!(db.alias_by_factors("auth_up_1", "alice").unwrap().id, alias_id);
        assert_eq!(db.entities_by_bucket("ab").len(), 1);
    }

    #[test]
    fn test_case_insensitive_name_lookup() {
        let mut db = DbState::new(false);
        let e = entity("Alice");
        let id = e.id;
        db.insert_entity(Arc::new(e));

        assert_eq!(db.entity_by_name(&NamespaceId::root(), "ALICE").unwrap().id, id);
    }

    #[test]
    fn test_case_sensitive_name_lookup() {
        let mut db = DbState::new(true);
        let e = entity("Alice");
        db.insert_entity(Arc::new(e));

        assert!(db.entity_by_name(&NamespaceId::root(), "alice").is_none());
        assert!(db.entity_by_name(&NamespaceId::root(), "Alice").is_some());
    }

    #[test]
    fn test_name_index_last_write_wins() {
        let mut db = DbState::new(true);
        let first = entity("bob");
        let second = entity("bob");
        let (first_id, second_id) = (first.id, second.id);
        db.insert_entity(Arc::new(first));
        db.insert_entity(Arc::new(second));

        // Both reachable by ID, the later insert owns the name binding.
        assert!(db.entity_by_id(first_id).is_some());
        assert_eq!(db.entity_by_name(&NamespaceId::root(), "bob").unwrap().id, second_id);

        // Deleting the loser leaves the winner's binding untouched.
        db.delete_entity(first_id);
        assert_eq!(db.entity_by_name(&NamespaceId::root(), "bob").unwrap().id, second_id);

        // Deleting the winner unbinds the name; the loser is gone entirely.
        db.delete_entity(second_id);
        assert!(db.entity_by_name(&NamespaceId::root(), "bob").is_none());
    }

    #[test]
    fn test_update_refreshes_name_index() {
        let mut db = DbState::new(false);
        let e = entity("alice");
        let id = e.id;
        db.insert_entity(Arc::new(e.clone()));

        let mut renamed = e;
        renamed.name = "alicia".to_string();
        db.insert_entity(Arc::new(renamed));

        assert!(db.entity_by_name(&NamespaceId::root(), "alice").is_none());
        assert_eq!(db.entity_by_name(&NamespaceId::root(), "alicia").unwrap().id, id);
    }

    #[test]
    fn test_alias_transfer_keeps_new_owner_mirror() {
        let mut db = DbState::new(false);
        let mut source = entity_with_alias("alice", "shared", "auth_up_1");
        let dest = entity("bob");
        let dest_id = dest.id;
        let mut alias = source.aliases[0].clone();
        db.insert_entity(Arc::new(source.clone()));
        db.insert_entity(Arc::new(dest.clone()));

        // Move the alias: new owner inserted first, then the stripped source.
        alias.entity_id = dest_id;
        let mut dest_updated = dest;
        dest_updated.aliases.push(alias.clone());
        db.insert_entity(Arc::new(dest_updated));

        source.aliases.clear();
        db.insert_entity(Arc::new(source));

        let mirrored = db.alias_by_factors("auth_up_1", "shared").unwrap();
        assert_eq!(mirrored.entity_id, dest_id);
        assert_eq!(db.alias_by_id(alias.id).unwrap().entity_id, dest_id);
    }

    #[test]
    fn test_merged_entity_index() {
        let mut db = DbState::new(false);
        let retired = EntityId::new();
        let mut e = entity("survivor");
        e.merged_entity_ids.push(retired);
        let live_id = e.id;
        db.insert_entity(Arc::new(e));

        assert_eq!(db.entity_by_merged_id(retired).unwrap().id, live_id);
        assert!(db.entity_by_id(retired).is_none());

        db.delete_entity(live_id);
        assert!(db.entity_by_merged_id(retired).is_none());
    }

    #[test]
    fn test_metadata_scan() {
        let mut db = DbState::new(false);
        let mut e1 = entity("alice");
        e1.metadata.insert("team".to_string(), "platform".to_string());
        let mut e2 = entity("bob");
        e2.metadata.insert("team".to_string(), "sales".to_string());
        db.insert_entity(Arc::new(e1));
        db.insert_entity(Arc::new(e2));

        let hits = db.entities_by_metadata("team", "platform");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "alice");
    }

    #[test]
    fn test_group_indexes() {
        let mut db = DbState::new(false);
        let parent_id = GroupId::new();
        let member_entity = EntityId::new();
        let mut g = Group::new("engineering", NamespaceId::root());
        g.parent_group_ids.push(parent_id);
        g.member_entity_ids.push(member_entity);
        g.policies.push("deploy".to_string());
        g.bucket_key = "7f".to_string();
        let gid = g.id;
        db.insert_group(Arc::new(g));

        assert_eq!(db.group_by_name(&NamespaceId::root(), "engineering").unwrap().id, gid);
        assert_eq!(db.groups_by_parent(parent_id).len(), 1);
        assert_eq!(db.groups_by_member_entity(member_entity).len(), 1);
        assert_eq!(db.groups_by_policy("deploy").len(), 1);
        assert_eq!(db.groups_by_bucket("7f").len(), 1);
    }

    #[test]
    fn test_group_unindex_on_update() {
        let mut db = DbState::new(false);
        let parent_id = GroupId::new();
        let mut g = Group::new("engineering", NamespaceId::root());
        g.parent_group_ids.push(parent_id);
        db.insert_group(Arc::new(g.clone()));

        g.parent_group_ids.clear();
        db.insert_group(Arc::new(g.clone()));
        assert!(db.groups_by_parent(parent_id).is_empty());

        db.delete_group(g.id);
        assert!(db.group_by_name(&NamespaceId::root(), "engineering").is_none());
        assert_eq!(db.group_count(), 0);
    }
}
