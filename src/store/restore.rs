//! Startup load from durable storage.
//!
//! Entities load on a bounded worker pool: a feeder hands bucket keys to
//! the workers, each fetched bucket is delivered into a slot for its
//! position in the key listing, and a coordinator applies buckets strictly
//! in listing order on the single writer. Workers answer every key they
//! receive, even after a failure elsewhere; an unanswered slot would wedge
//! the coordinator. The stop flag only halts the feeder, and the
//! coordinator bails on the first failed slot, so an error aborts the load
//! without ever deadlocking it.
//!
//! Groups load after entities, synchronously, so membership scrubbing can
//! see the full entity image.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;

use crate::conflict::ConflictResolver;
use crate::entity::Entity;
use crate::error::{IdentityError, IdentityResult};
use crate::group::Group;
use crate::memdb::WriteTxn;
use crate::namespace::NamespaceId;
use crate::storage::bucket::{bucket_key_for_id, Bucket};
use crate::storage::StorageError;

use super::IdentityStore;

impl IdentityStore {
    /// Loads every entity bucket into the in-memory image.
    pub(crate) fn load_entities(&self, resolver: &dyn ConflictResolver) -> IdentityResult<()> {
        let start = Instant::now();
        let bucket_keys = self.entity_packer.list_bucket_keys()?;
        if bucket_keys.is_empty() {
            tracing::debug!("No entity buckets in storage");
            return Ok(());
        }

        let workers = self.config.restore_workers.min(bucket_keys.len());
        let stop = AtomicBool::new(false);
        let (work_tx, work_rx) = bounded::<(usize, String)>(workers);

        // One single-use slot per bucket, indexed by listing position.
        type Fetched = Result<Option<Bucket<Entity>>, StorageError>;
        let mut slot_txs = Vec::with_capacity(bucket_keys.len());
        let mut slot_rxs = Vec::with_capacity(bucket_keys.len());
        for _ in &bucket_keys {
            let (tx, rx) = bounded::<Fetched>(1);
            slot_txs.push(tx);
            slot_rxs.push(rx);
        }

        let mut entities_loaded = 0usize;
        let mut aliases_loaded = 0usize;
        let mut duplicate_accessors: BTreeMap<String, usize> = BTreeMap::new();

        thread::scope(|scope| -> IdentityResult<()> {
            let keys = &bucket_keys;
            let stop_flag = &stop;
            thread::Builder::new()
                .name("idgraph-restore-feed".to_string())
                .spawn_scoped(scope, move || {
                    for (index, key) in keys.iter().enumerate() {
                        if stop_flag.load(Ordering::Acquire) {
                            break;
                        }
                        if work_tx.send((index, key.clone())).is_err() {
                            break;
                        }
                    }
                })
                .expect("failed to spawn restore feeder");

            for w in 0..workers {
                let work_rx = work_rx.clone();
                let slots = &slot_txs;
                let stop_flag = &stop;
                let packer = &self.entity_packer;
                thread::Builder::new()
                    .name(format!("idgraph-restore-{w}"))
                    .spawn_scoped(scope, move || {
                        while let Ok((index, key)) = work_rx.recv() {
                            let fetched = packer.get_bucket(&key);
                            if fetched.is_err() {
                                stop_flag.store(true, Ordering::Release);
                            }
                            if slots[index].send(fetched).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn restore worker");
            }
            drop(work_rx);

            let mut txn = self.db.begin_write();
            let mut staged = 0usize;
            for (index, key) in bucket_keys.iter().enumerate() {
                let bucket = match slot_rxs[index].recv() {
                    Ok(Ok(Some(bucket))) => bucket,
                    Ok(Ok(None)) => continue,
                    Ok(Err(err)) => {
                        stop.store(true, Ordering::Release);
                        return Err(err.into());
                    }
                    Err(_) => {
                        stop.store(true, Ordering::Release);
                        return Err(IdentityError::internal(format!(
                            "restore worker abandoned bucket {key}"
                        )));
                    }
                };

                for item in bucket.items {
                    match self.apply_restored_entity(
                        &mut txn,
                        item.data,
                        resolver,
                        &mut duplicate_accessors,
                    ) {
                        Ok(Some(weight)) => {
                            entities_loaded += 1;
                            aliases_loaded += weight - 1;
                            staged += weight;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            stop.store(true, Ordering::Release);
                            return Err(err);
                        }
                    }
                    if staged >= self.config.restore_tx_batch {
                        txn.commit();
                        txn = self.db.begin_write();
                        staged = 0;
                    }
                }
            }
            txn.commit();
            Ok(())
        })?;

        if !duplicate_accessors.is_empty() {
            let extra: usize = duplicate_accessors.values().sum();
            tracing::warn!(
                aliases = extra,
                mount_accessors = ?duplicate_accessors.keys().collect::<Vec<_>>(),
                "Entities carrying several aliases on one mount; likely duplicates"
            );
        }
        tracing::info!(
            entities = entities_loaded,
            aliases = aliases_loaded,
            buckets = bucket_keys.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Entities restored"
        );
        Ok(())
    }

    /// Applies one stored entity to the load transaction.
    ///
    /// Returns the record's staged weight (one plus its kept aliases), or
    /// `None` when the entity was dropped because its namespace is gone.
    fn apply_restored_entity(
        &self,
        txn: &mut WriteTxn<'_>,
        mut entity: Entity,
        resolver: &dyn ConflictResolver,
        duplicate_accessors: &mut BTreeMap<String, usize>,
    ) -> IdentityResult<Option<usize>> {
        if entity.bucket_key.is_empty() {
            entity.bucket_key = bucket_key_for_id(&entity.id.to_string());
        }
        if entity.namespace_id.is_empty() {
            entity.namespace_id = NamespaceId::root();
        }
        if self
            .namespaces
            .namespace_by_id(&entity.namespace_id)
            .is_none()
        {
            tracing::warn!(
                entity_id = %entity.id,
                namespace_id = %entity.namespace_id,
                "Deleting entity whose namespace no longer exists"
            );
            self.entity_packer
                .delete_item(&entity.bucket_key, &entity.id.to_string())?;
            return Ok(None);
        }

        // Several aliases on one mount within a single entity are legal but
        // almost always login artifacts; they are tallied for the closing
        // summary.
        let mut per_accessor: BTreeMap<&str, usize> = BTreeMap::new();
        for alias in &entity.aliases {
            *per_accessor.entry(alias.mount_accessor.as_str()).or_insert(0) += 1;
        }
        for (accessor, count) in per_accessor {
            if count > 1 {
                *duplicate_accessors.entry(accessor.to_string()).or_insert(0) += count - 1;
            }
        }

        // Consulted for every entity, not only on an index hit, so that
        // reporting strategies see each record that goes in.
        let existing = txn
            .entity_by_name(&entity.namespace_id, &entity.name)
            .filter(|e| e.id != entity.id);
        if let Err(err) = resolver.resolve_entities(existing.as_deref(), &mut entity) {
            if !txn.case_sensitive() {
                return Err(err);
            }
        }

        self.upsert_entity_in_txn(txn, &mut entity, None, resolver, false)?;
        Ok(Some(1 + entity.aliases.len()))
    }

    /// Loads every group bucket into the in-memory image.
    ///
    /// Members pointing at entities that no longer exist are scrubbed, and
    /// a scrubbed group is written back to storage.
    pub(crate) fn load_groups(&self, resolver: &dyn ConflictResolver) -> IdentityResult<()> {
        let start = Instant::now();
        let bucket_keys = self.group_packer.list_bucket_keys()?;
        let mut groups_loaded = 0usize;

        for key in &bucket_keys {
            let Some(bucket) = self.group_packer.get_bucket(key)? else {
                continue;
            };
            let mut txn = self.db.begin_write();
            for item in bucket.items {
                let mut group: Group = item.data;
                if group.bucket_key.is_empty() {
                    group.bucket_key = bucket_key_for_id(&group.id.to_string());
                }
                if group.namespace_id.is_empty() {
                    group.namespace_id = NamespaceId::root();
                }
                if self
                    .namespaces
                    .namespace_by_id(&group.namespace_id)
                    .is_none()
                {
                    tracing::warn!(
                        group_id = %group.id,
                        namespace_id = %group.namespace_id,
                        "Deleting group whose namespace no longer exists"
                    );
                    self.group_packer
                        .delete_item(&group.bucket_key, &group.id.to_string())?;
                    continue;
                }

                let existing = txn
                    .group_by_name(&group.namespace_id, &group.name)
                    .filter(|g| g.id != group.id);
                if let Err(err) = resolver.resolve_groups(existing.as_deref(), &mut group) {
                    if !txn.case_sensitive() {
                        return Err(err);
                    }
                }

                let before = group.member_entity_ids.len();
                group
                    .member_entity_ids
                    .retain(|id| txn.entity_by_id(*id).is_some());
                let scrubbed = group.member_entity_ids.len() != before;

                groups_loaded += 1;
                if scrubbed {
                    tracing::warn!(
                        group_id = %group.id,
                        removed = before - group.member_entity_ids.len(),
                        "Scrubbing deleted entities from group membership"
                    );
                    self.upsert_group_in_txn(&mut txn, &mut group, true)?;
                } else {
                    txn.insert_group(Arc::new(group));
                }
            }
            txn.commit();
        }

        tracing::info!(
            groups = groups_loaded,
            buckets = bucket_keys.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Groups restored"
        );
        Ok(())
    }
}
