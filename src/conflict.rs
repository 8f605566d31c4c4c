//! Name-conflict resolution strategies.
//!
//! Two records may not share a name within one namespace, nor two aliases a
//! (mount accessor, name) pair. When an insert collides, the store hands
//! both records to a [`ConflictResolver`] and acts on its verdict: fail the
//! operation, rename the newcomer, or record the collision and carry on.
//! Resolvers are also consulted with `existing = None` on the non-colliding
//! path; they must succeed there, and the failing and renaming strategies
//! treat it as a no-op, while the reporting one uses it to observe every
//! record that goes in.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::alias::Alias;
use crate::entity::Entity;
use crate::error::{ConflictError, DuplicateKind, IdentityResult};
use crate::group::Group;

/// Metadata key written onto a renamed duplicate, pointing at the record
/// that kept the original name.
pub const DUPLICATE_OF_METADATA_KEY: &str = "duplicate_of_canonical_id";

/// Strategy invoked when a new record would collide by name.
///
/// `duplicate` is the incoming record, mutable so a strategy may rewrite it
/// (rename) before insertion proceeds. Returning an error fails the insert;
/// returning the duplicate-name sentinel additionally tells startup loading
/// to fall back to case-sensitive matching.
///
/// A record is never its own duplicate: when `existing` carries the same ID
/// as `duplicate` (a re-apply of the same record), implementations return
/// `Ok(())` without logging or recording anything.
pub trait ConflictResolver: Send + Sync {
    /// Called when `duplicate`'s name collides with `existing`.
    ///
    /// # Errors
    ///
    /// Strategy-dependent; must return `Ok(())` when `existing` is `None`.
    fn resolve_entities(
        &self,
        existing: Option<&Entity>,
        duplicate: &mut Entity,
    ) -> IdentityResult<()>;

    /// Called when `duplicate`'s name collides with `existing`.
    ///
    /// # Errors
    ///
    /// Strategy-dependent; must return `Ok(())` when `existing` is `None`.
    fn resolve_groups(&self, existing: Option<&Group>, duplicate: &mut Group)
        -> IdentityResult<()>;

    /// Called when `duplicate`'s factors collide with `existing`. `parent`
    /// is the entity the duplicate alias is being attached to.
    ///
    /// # Errors
    ///
    /// Strategy-dependent; must return `Ok(())` when `existing` is `None`.
    fn resolve_aliases(
        &self,
        parent: &Entity,
        existing: Option<&Alias>,
        duplicate: &mut Alias,
    ) -> IdentityResult<()>;
}

fn sentinel(kind: DuplicateKind, name: &str) -> ConflictError {
    ConflictError::DuplicateName {
        kind,
        name: name.to_string(),
    }
}

/// Fails every collision with the duplicate-name sentinel after logging a
/// structured warning. The default strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorReportResolver;

impl ConflictResolver for ErrorReportResolver {
    fn resolve_entities(
        &self,
        existing: Option<&Entity>,
        duplicate: &mut Entity,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        tracing::warn!(
            name = %duplicate.name,
            existing_id = %existing.id,
            duplicate_id = %duplicate.id,
            namespace_id = %duplicate.namespace_id,
            remediation = "enable deduplicate_names to rename duplicates deterministically",
            "Duplicate entity name"
        );
        Err(sentinel(DuplicateKind::Entity, &duplicate.name).into())
    }

    fn resolve_groups(
        &self,
        existing: Option<&Group>,
        duplicate: &mut Group,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        tracing::warn!(
            name = %duplicate.name,
            existing_id = %existing.id,
            duplicate_id = %duplicate.id,
            namespace_id = %duplicate.namespace_id,
            remediation = "enable deduplicate_names to rename duplicates deterministically",
            "Duplicate group name"
        );
        Err(sentinel(DuplicateKind::Group, &duplicate.name).into())
    }

    fn resolve_aliases(
        &self,
        parent: &Entity,
        existing: Option<&Alias>,
        duplicate: &mut Alias,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        tracing::warn!(
            name = %duplicate.name,
            mount_accessor = %duplicate.mount_accessor,
            existing_alias_id = %existing.id,
            duplicate_alias_id = %duplicate.id,
            entity_id = %parent.id,
            "Duplicate alias factors"
        );
        Err(sentinel(DuplicateKind::Alias, &duplicate.name).into())
    }
}

/// Renames colliding entities and groups deterministically.
///
/// The duplicate keeps working under `<name>-<its own ID>` and is annotated
/// with [`DUPLICATE_OF_METADATA_KEY`] so operators can find what it
/// collided with. Aliases cannot be renamed without changing which login
/// they match, so alias collisions still fail with the sentinel.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameResolver;

impl ConflictResolver for RenameResolver {
    fn resolve_entities(
        &self,
        existing: Option<&Entity>,
        duplicate: &mut Entity,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        let renamed = format!("{}-{}", duplicate.name, duplicate.id);
        tracing::warn!(
            old_name = %duplicate.name,
            new_name = %renamed,
            existing_id = %existing.id,
            duplicate_id = %duplicate.id,
            "Renaming duplicate entity"
        );
        duplicate.name = renamed;
        duplicate.metadata.insert(
            DUPLICATE_OF_METADATA_KEY.to_string(),
            existing.id.to_string(),
        );
        Ok(())
    }

    fn resolve_groups(
        &self,
        existing: Option<&Group>,
        duplicate: &mut Group,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        let renamed = format!("{}-{}", duplicate.name, duplicate.id);
        tracing::warn!(
            old_name = %duplicate.name,
            new_name = %renamed,
            existing_id = %existing.id,
            duplicate_id = %duplicate.id,
            "Renaming duplicate group"
        );
        duplicate.name = renamed;
        duplicate.metadata.insert(
            DUPLICATE_OF_METADATA_KEY.to_string(),
            existing.id.to_string(),
        );
        Ok(())
    }

    fn resolve_aliases(
        &self,
        parent: &Entity,
        existing: Option<&Alias>,
        duplicate: &mut Alias,
    ) -> IdentityResult<()> {
        let Some(existing) = existing else {
            return Ok(());
        };
        if existing.id == duplicate.id {
            return Ok(());
        }
        tracing::warn!(
            name = %duplicate.name,
            mount_accessor = %duplicate.mount_accessor,
            existing_alias_id = %existing.id,
            duplicate_alias_id = %duplicate.id,
            entity_id = %parent.id,
            "Duplicate alias factors cannot be renamed"
        );
        Err(sentinel(DuplicateKind::Alias, &duplicate.name).into())
    }
}

/// One set of records sharing a folded name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSet {
    /// Namespace ID for entities and groups, mount accessor for aliases.
    pub scope: String,
    /// The colliding name, folded to lowercase.
    pub name: String,
    /// IDs of every record seen under that name, in discovery order.
    pub ids: Vec<String>,
}

/// Everything the [`DuplicateReporter`] accumulated during one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    /// Entity name collisions.
    pub entities: Vec<DuplicateSet>,
    /// Group name collisions.
    pub groups: Vec<DuplicateSet>,
    /// Factor collisions between aliases from local mounts.
    pub local_aliases: Vec<DuplicateSet>,
    /// Factor collisions between aliases from shared mounts.
    pub aliases: Vec<DuplicateSet>,
}

impl DuplicateReport {
    /// True when no collisions were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.groups.is_empty()
            && self.local_aliases.is_empty()
            && self.aliases.is_empty()
    }

    /// Total number of collision sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + self.groups.len() + self.local_aliases.len() + self.aliases.len()
    }

    /// Emits one warning per collision set plus a closing summary.
    pub fn log(&self) {
        for set in &self.entities {
            tracing::warn!(
                namespace_id = %set.scope,
                name = %set.name,
                ids = ?set.ids,
                remediation = "rename or merge these entities, or enable deduplicate_names",
                "Duplicate entity names detected"
            );
        }
        for set in &self.groups {
            tracing::warn!(
                namespace_id = %set.scope,
                name = %set.name,
                ids = ?set.ids,
                remediation = "rename these groups, or enable deduplicate_names",
                "Duplicate group names detected"
            );
        }
        for set in &self.local_aliases {
            tracing::warn!(
                mount_accessor = %set.scope,
                name = %set.name,
                ids = ?set.ids,
                "Duplicate local alias factors detected"
            );
        }
        for set in &self.aliases {
            tracing::warn!(
                mount_accessor = %set.scope,
                name = %set.name,
                ids = ?set.ids,
                "Duplicate alias factors detected"
            );
        }
        tracing::warn!(
            entities = self.entities.len(),
            groups = self.groups.len(),
            local_aliases = self.local_aliases.len(),
            aliases = self.aliases.len(),
            "Duplicate scan complete; duplicates are reachable by ID but shadowed by name"
        );
    }
}

type ReportKey = (DuplicateKind, bool, String, String);

/// Accumulates name collisions without failing any of them.
///
/// Used for the case-sensitive reload after the sentinel fired. Case
/// variants stop colliding in the index once matching is case-sensitive,
/// so the reporter cannot rely on being handed an `existing` record: it
/// notes every record it is shown under that record's folded name, and
/// the sets that end up holding more than one ID become the report.
#[derive(Debug, Default)]
pub struct DuplicateReporter {
    // Keyed by (kind, local, scope, folded name) so the report comes out in
    // a stable order regardless of bucket arrival order.
    seen: Mutex<BTreeMap<ReportKey, Vec<String>>>,
}

impl DuplicateReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn note(
        &self,
        kind: DuplicateKind,
        local: bool,
        scope: String,
        name: &str,
        existing_id: Option<String>,
        duplicate_id: String,
    ) {
        let folded = name.to_lowercase();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let ids = seen.entry((kind, local, scope, folded)).or_default();
        for id in existing_id.into_iter().chain([duplicate_id]) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// Drains the accumulated report.
    #[must_use]
    pub fn take_report(&self) -> DuplicateReport {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = DuplicateReport::default();
        for ((kind, local, scope, name), ids) in std::mem::take(&mut *seen) {
            if ids.len() < 2 {
                continue;
            }
            let set = DuplicateSet { scope, name, ids };
            match (kind, local) {
                (DuplicateKind::Entity, _) => report.entities.push(set),
                (DuplicateKind::Group, _) => report.groups.push(set),
                (DuplicateKind::Alias, true) => report.local_aliases.push(set),
                (DuplicateKind::Alias, false) => report.aliases.push(set),
            }
        }
        report
    }
}

impl ConflictResolver for DuplicateReporter {
    fn resolve_entities(
        &self,
        existing: Option<&Entity>,
        duplicate: &mut Entity,
    ) -> IdentityResult<()> {
        let existing_id = match existing {
            Some(e) if e.id == duplicate.id => return Ok(()),
            Some(e) => Some(e.id.to_string()),
            None => None,
        };
        self.note(
            DuplicateKind::Entity,
            false,
            duplicate.namespace_id.to_string(),
            &duplicate.name,
            existing_id,
            duplicate.id.to_string(),
        );
        Ok(())
    }

    fn resolve_groups(
        &self,
        existing: Option<&Group>,
        duplicate: &mut Group,
    ) -> IdentityResult<()> {
        let existing_id = match existing {
            Some(g) if g.id == duplicate.id => return Ok(()),
            Some(g) => Some(g.id.to_string()),
            None => None,
        };
        self.note(
            DuplicateKind::Group,
            false,
            duplicate.namespace_id.to_string(),
            &duplicate.name,
            existing_id,
            duplicate.id.to_string(),
        );
        Ok(())
    }

    fn resolve_aliases(
        &self,
        _parent: &Entity,
        existing: Option<&Alias>,
        duplicate: &mut Alias,
    ) -> IdentityResult<()> {
        let existing_id = match existing {
            Some(a) if a.id == duplicate.id => return Ok(()),
            Some(a) => Some(a.id.to_string()),
            None => None,
        };
        self.note(
            DuplicateKind::Alias,
            duplicate.local,
            duplicate.mount_accessor.clone(),
            &duplicate.name,
            existing_id,
            duplicate.id.to_string(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceId;

    fn entity(name: &str) -> Entity {
        Entity::new(name, NamespaceId::root())
    }

    #[test]
    fn test_error_resolver_no_collision_is_noop() {
        let resolver = ErrorReportResolver;
        let mut dup = entity("alice");
        let before = dup.clone();
        resolver.resolve_entities(None, &mut dup).unwrap();
        assert_eq!(dup.name, before.name);
    }

    #[test]
    fn test_error_resolver_returns_sentinel() {
        let resolver = ErrorReportResolver;
        let existing = entity("alice");
        let mut dup = entity("Alice");
        let err = resolver
            .resolve_entities(Some(&existing), &mut dup)
            .unwrap_err();
        assert!(err.is_duplicate_name());
    }

    #[test]
    fn test_rename_resolver_renames_entity() {
        let resolver = RenameResolver;
        let existing = entity("alice");
        let mut dup = entity("Alice");
        let dup_id = dup.id;

        resolver.resolve_entities(Some(&existing), &mut dup).unwrap();

        assert_eq!(dup.name, format!("Alice-{dup_id}"));
        assert_eq!(
            dup.metadata.get(DUPLICATE_OF_METADATA_KEY),
            Some(&existing.id.to_string())
        );
    }

    #[test]
    fn test_rename_resolver_renames_group() {
        let resolver = RenameResolver;
        let existing = Group::new("eng", NamespaceId::root());
        let mut dup = Group::new("ENG", NamespaceId::root());
        let dup_id = dup.id;

        resolver.resolve_groups(Some(&existing), &mut dup).unwrap();
        assert_eq!(dup.name, format!("ENG-{dup_id}"));
    }

    #[test]
    fn test_rename_resolver_rejects_alias_collisions() {
        let resolver = RenameResolver;
        let parent = entity("alice");
        let existing = Alias::new("bob", parent.id, "auth_up_1");
        let mut dup = Alias::new("Bob", parent.id, "auth_up_1");

        let err = resolver
            .resolve_aliases(&parent, Some(&existing), &mut dup)
            .unwrap_err();
        assert!(err.is_duplicate_name());
        assert_eq!(dup.name, "Bob");
    }

    #[test]
    fn test_reporter_accumulates_and_drains() {
        let reporter = DuplicateReporter::new();
        let existing = entity("alice");
        let mut dup_a = entity("Alice");
        let mut dup_b = entity("ALICE");

        reporter.resolve_entities(Some(&existing), &mut dup_a).unwrap();
        reporter.resolve_entities(Some(&existing), &mut dup_b).unwrap();

        let report = reporter.take_report();
        assert_eq!(report.entities.len(), 1);
        let set = &report.entities[0];
        assert_eq!(set.name, "alice");
        // existing + two duplicates, the shared existing ID recorded once.
        assert_eq!(set.ids.len(), 3);
        assert!(set.ids.contains(&existing.id.to_string()));

        assert!(reporter.take_report().is_empty());
    }

    #[test]
    fn test_reporter_splits_local_aliases() {
        let reporter = DuplicateReporter::new();
        let parent = entity("alice");

        let existing_shared = Alias::new("bob", parent.id, "auth_up_1");
        let mut dup_shared = Alias::new("bob", parent.id, "auth_up_1");
        reporter
            .resolve_aliases(&parent, Some(&existing_shared), &mut dup_shared)
            .unwrap();

        let mut existing_local = Alias::new("carol", parent.id, "auth_local_1");
        existing_local.local = true;
        let mut dup_local = existing_local.clone();
        dup_local.id = crate::alias::AliasId::new();
        reporter
            .resolve_aliases(&parent, Some(&existing_local), &mut dup_local)
            .unwrap();

        let report = reporter.take_report();
        assert_eq!(report.aliases.len(), 1);
        assert_eq!(report.local_aliases.len(), 1);
        assert_eq!(report.len(), 2);
        assert_eq!(report.aliases[0].scope, "auth_up_1");
    }

    #[test]
    fn test_reporter_detects_case_variants_without_collision() {
        // Under case-sensitive matching the two names never collide in the
        // index, so both consults arrive with no existing record.
        let reporter = DuplicateReporter::new();
        reporter
            .resolve_entities(None, &mut entity("Alice"))
            .unwrap();
        reporter
            .resolve_entities(None, &mut entity("alice"))
            .unwrap();

        let report = reporter.take_report();
        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.entities[0].name, "alice");
        assert_eq!(report.entities[0].ids.len(), 2);
    }

    #[test]
    fn test_reporter_never_fails() {
        let reporter = DuplicateReporter::new();
        let mut dup = entity("alice");
        assert!(reporter.resolve_entities(None, &mut dup).is_ok());
        assert!(reporter.take_report().is_empty());
    }

    #[test]
    fn test_same_record_is_not_a_duplicate() {
        let existing = entity("alice");
        let mut reapplied = existing.clone();

        ErrorReportResolver
            .resolve_entities(Some(&existing), &mut reapplied)
            .unwrap();
        RenameResolver
            .resolve_entities(Some(&existing), &mut reapplied)
            .unwrap();
        assert_eq!(reapplied.name, "alice");

        let reporter = DuplicateReporter::new();
        reporter
            .resolve_entities(Some(&existing), &mut reapplied)
            .unwrap();
        assert!(reporter.take_report().is_empty());
    }
}
