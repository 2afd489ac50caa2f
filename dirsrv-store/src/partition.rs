//! One partition's indexed storage: a master table keyed by entry id, a DN
//! index, one-level/sublevel navigation indices, a shared forward
//! attribute index, and an alias index, all backed by a single LMDB
//! environment.
//!
//! Every mutating method takes the partition's write lock for its whole
//! duration; the master table and every index it touches are updated
//! before the lock is released, so a reader taking the read lock never
//! observes a DN index entry without its matching master-table row.
//! Indexed reads (`scan_*`) take the read lock only long enough to copy
//! matching ids out of LMDB into a [`VecCursor`] — see that type for why
//! cursors are eagerly materialized rather than held open against LMDB.

use crate::cursor::VecCursor;
use crate::error::{StoreError, StoreResult};
use crate::keys;
use dirsrv_core::{
    Dn, DirectoryError, DirectoryResult, Entry, EntryId, EntryIdAllocator, Modification, Rdn,
    SchemaRegistry,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::RwLock;

const DEFAULT_MAP_SIZE_MB: usize = 256;

pub struct PartitionStore {
    suffix: Dn,
    env: Env,
    id2entry: Database<Bytes, Bytes>,
    dn2id: Database<Bytes, Bytes>,
    children: Database<Bytes, Bytes>,
    sublevel: Database<Bytes, Bytes>,
    index: Database<Bytes, Bytes>,
    alias: Database<Bytes, Bytes>,
    meta: Database<Bytes, Bytes>,
    allocator: EntryIdAllocator,
    lock: RwLock<()>,
    /// Attribute names/OIDs to forward-index. `None` indexes every schema
    /// attribute type, matching this store's behavior before a partition
    /// could restrict it.
    indexed_attributes: Option<Vec<String>>,
}

impl PartitionStore {
    /// Open (creating if absent) the LMDB environment backing this
    /// partition's suffix, restoring the id allocator's high-water mark
    /// from the `meta` database.
    pub fn open<P: AsRef<Path>>(path: P, suffix: Dn) -> StoreResult<Self> {
        std::fs::create_dir_all(&path).map_err(StoreError::Io)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE_MB * 1024 * 1024)
                .max_dbs(8)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let id2entry = env
            .create_database(&mut wtxn, Some("id2entry"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let dn2id = env
            .create_database(&mut wtxn, Some("dn2id"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let children = env
            .create_database(&mut wtxn, Some("children"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let sublevel = env
            .create_database(&mut wtxn, Some("sublevel"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let index = env
            .create_database(&mut wtxn, Some("index"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let alias = env
            .create_database(&mut wtxn, Some("alias"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let meta: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("meta"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;

        let next_id = meta
            .get(&wtxn, keys::NEXT_ENTRY_ID_KEY)
            .map_err(|e| StoreError::Transaction(e.to_string()))?
            .and_then(|bytes| keys::decode_id(bytes))
            .map(|id| id.get())
            .unwrap_or(1);

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;

        Ok(Self {
            suffix,
            env,
            id2entry,
            dn2id,
            children,
            sublevel,
            index,
            alias,
            meta,
            allocator: EntryIdAllocator::starting_at(next_id),
            lock: RwLock::new(()),
            indexed_attributes: None,
        })
    }

    /// Restrict forward indexing to this set of attribute names/OIDs; any
    /// schema attribute type not named here is stored but never indexed.
    /// An empty list is treated the same as not calling this at all.
    pub fn with_indexed_attributes(mut self, attrs: Vec<String>) -> Self {
        self.indexed_attributes = if attrs.is_empty() { None } else { Some(attrs) };
        self
    }

    pub(crate) fn is_indexed(&self, at: &dirsrv_core::schema::AttributeType) -> bool {
        match &self.indexed_attributes {
            Some(allowed) => allowed.iter().any(|a| at.has_name(a)),
            None => true,
        }
    }

    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    fn serialize_entry(entry: &Entry) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(entry).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize_entry(bytes: &[u8]) -> StoreResult<Entry> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|e| e.into_inner())
    }

    fn id_for_dn(&self, rtxn: &heed::RoTxn<'_>, dn: &Dn) -> StoreResult<Option<EntryId>> {
        let key = dn.to_normalized_string();
        let found = self
            .dn2id
            .get(rtxn, key.as_bytes())
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(found.and_then(keys::decode_id))
    }

    fn entry_for_id(&self, rtxn: &heed::RoTxn<'_>, id: EntryId) -> StoreResult<Option<Entry>> {
        let found = self
            .id2entry
            .get(rtxn, &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        found.map(Self::deserialize_entry).transpose()
    }

    pub fn has_entry(&self, dn: &Dn) -> DirectoryResult<bool> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(self.id_for_dn(&rtxn, dn)?.is_some())
    }

    pub fn lookup(&self, dn: &Dn) -> DirectoryResult<Option<Entry>> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let Some(id) = self.id_for_dn(&rtxn, dn)? else {
            return Ok(None);
        };
        Ok(self.entry_for_id(&rtxn, id)?)
    }

    pub fn lookup_by_id(&self, id: EntryId) -> DirectoryResult<Option<Entry>> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(self.entry_for_id(&rtxn, id)?)
    }

    pub fn id_of(&self, dn: &Dn) -> DirectoryResult<Option<EntryId>> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(self.id_for_dn(&rtxn, dn)?)
    }

    /// Ancestor chain from `dn`'s parent up to (but not including) the
    /// partition root, resolved to ids. Used to maintain the sublevel
    /// index and to walk an entry's administrative point candidates.
    fn resolve_ancestor_ids(&self, rtxn: &heed::RoTxn<'_>, dn: &Dn) -> StoreResult<Vec<EntryId>> {
        let mut ids = Vec::new();
        let mut cursor = dn.parent();
        while let Some(ancestor) = cursor {
            if ancestor.is_root() && !ancestor.equals(&self.suffix) {
                break;
            }
            match self.id_for_dn(rtxn, &ancestor)? {
                Some(id) => ids.push(id),
                None => break,
            }
            if ancestor.equals(&self.suffix) {
                break;
            }
            cursor = ancestor.parent();
        }
        Ok(ids)
    }

    fn index_entry_values(
        &self,
        wtxn: &mut heed::RwTxn<'_>,
        id: EntryId,
        entry: &Entry,
        schema: &SchemaRegistry,
    ) -> StoreResult<()> {
        for at in schema.attribute_types() {
            if !self.is_indexed(at) {
                continue;
            }
            let Some(values) = entry.values(&at.oid, schema) else {
                continue;
            };
            for value in values {
                let Some(norm) = &value.normalized else {
                    continue;
                };
                let key = keys::encode_index_key(&at.oid, norm, id);
                self.index
                    .put(wtxn, &key, &[])
                    .map_err(|e| StoreError::Transaction(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn unindex_entry_values(
        &self,
        wtxn: &mut heed::RwTxn<'_>,
        id: EntryId,
        entry: &Entry,
        schema: &SchemaRegistry,
    ) -> StoreResult<()> {
        for at in schema.attribute_types() {
            if !self.is_indexed(at) {
                continue;
            }
            let Some(values) = entry.values(&at.oid, schema) else {
                continue;
            };
            for value in values {
                let Some(norm) = &value.normalized else {
                    continue;
                };
                let key = keys::encode_index_key(&at.oid, norm, id);
                self.index
                    .delete(wtxn, &key)
                    .map_err(|e| StoreError::Transaction(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// If `entry` carries an `aliasedObjectName` value, parse and normalize
    /// it and record it in the alias index so the search evaluator can
    /// dereference this entry without re-parsing its attributes.
    fn index_alias_target(
        &self,
        wtxn: &mut heed::RwTxn<'_>,
        id: EntryId,
        entry: &Entry,
        schema: &SchemaRegistry,
    ) -> StoreResult<()> {
        let Some(raw) = entry
            .values("aliasedObjectName", schema)
            .and_then(|values| values.first())
        else {
            return Ok(());
        };
        let mut target = dirsrv_dsl::parse_dn(raw.raw.as_text().as_ref())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        target
            .normalize(schema)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let bytes = serde_json::to_vec(&target).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.alias
            .put(wtxn, &keys::encode_id(id), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Insert `entry` (already normalized by the caller) under the next
    /// allocated id. Fails with [`DirectoryError::AlreadyExists`] if its DN
    /// is already occupied, or [`DirectoryError::NotFound`] if its parent
    /// isn't present (unless it is this partition's suffix).
    pub fn add(&self, entry: Entry, schema: &SchemaRegistry) -> DirectoryResult<EntryId> {
        let _guard = self.write_lock();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        if self.id_for_dn(&wtxn, entry.dn())?.is_some() {
            return Err(DirectoryError::AlreadyExists(entry.dn().clone()));
        }

        let parent_id = match entry.dn().parent() {
            Some(parent) if !entry.dn().equals(&self.suffix) => {
                Some(self.id_for_dn(&wtxn, &parent)?.ok_or_else(|| {
                    DirectoryError::NotFound(parent.clone())
                })?)
            }
            _ => None,
        };

        let id = self.allocator.allocate();
        let bytes = Self::serialize_entry(&entry)?;
        self.id2entry
            .put(&mut wtxn, &keys::encode_id(id), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        self.dn2id
            .put(&mut wtxn, entry.dn().to_normalized_string().as_bytes(), &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        if let Some(parent_id) = parent_id {
            let key = keys::encode_adjacency_key(parent_id, id);
            self.children
                .put(&mut wtxn, &key, &[])
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
            let mut ancestors = vec![parent_id];
            ancestors.extend(self.resolve_ancestor_ids(&wtxn, entry.dn())?);
            for ancestor in ancestors {
                let key = keys::encode_adjacency_key(ancestor, id);
                self.sublevel
                    .put(&mut wtxn, &key, &[])
                    .map_err(|e| StoreError::Transaction(e.to_string()))?;
            }
        }

        self.index_entry_values(&mut wtxn, id, &entry, schema)?;

        self.index_alias_target(&mut wtxn, id, &entry, schema)?;

        self.meta
            .put(&mut wtxn, keys::NEXT_ENTRY_ID_KEY, &self.allocator.peek_next().to_be_bytes())
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(id)
    }

    /// Remove a leaf entry. Fails with [`DirectoryError::NotLeaf`] if it
    /// still has children, per the RFC 4511 delete contract.
    pub fn delete(&self, dn: &Dn, schema: &SchemaRegistry) -> DirectoryResult<()> {
        let _guard = self.write_lock();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let id = self
            .id_for_dn(&wtxn, dn)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;

        let has_children = self.scan_prefix(&wtxn, &self.children, &keys::adjacency_prefix(id))?.next().is_some();
        if has_children {
            return Err(DirectoryError::NotLeaf(dn.clone()));
        }

        let entry = self
            .entry_for_id(&wtxn, id)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;

        self.unindex_entry_values(&mut wtxn, id, &entry, schema)?;
        self.alias
            .delete(&mut wtxn, &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        if let Some(parent) = dn.parent() {
            if !dn.equals(&self.suffix) {
                if let Some(parent_id) = self.id_for_dn(&wtxn, &parent)? {
                    self.children
                        .delete(&mut wtxn, &keys::encode_adjacency_key(parent_id, id))
                        .map_err(|e| StoreError::Transaction(e.to_string()))?;
                }
                let mut ancestors = self.resolve_ancestor_ids(&wtxn, dn)?;
                if let Some(parent_id) = self.id_for_dn(&wtxn, &parent)? {
                    ancestors.push(parent_id);
                }
                for ancestor in ancestors {
                    self.sublevel
                        .delete(&mut wtxn, &keys::encode_adjacency_key(ancestor, id))
                        .map_err(|e| StoreError::Transaction(e.to_string()))?;
                }
            }
        }

        self.dn2id
            .delete(&mut wtxn, dn.to_normalized_string().as_bytes())
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        self.id2entry
            .delete(&mut wtxn, &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Apply a modify request to the entry named by `dn`, updating the
    /// forward index to match before committing.
    pub fn modify(
        &self,
        dn: &Dn,
        mods: &[Modification],
        schema: &SchemaRegistry,
    ) -> DirectoryResult<()> {
        let _guard = self.write_lock();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let id = self
            .id_for_dn(&wtxn, dn)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
        let mut entry = self
            .entry_for_id(&wtxn, id)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;

        self.unindex_entry_values(&mut wtxn, id, &entry, schema)?;
        dirsrv_core::apply_modifications(&mut entry, mods, schema)?;
        entry.normalize(schema)?;
        self.index_entry_values(&mut wtxn, id, &entry, schema)?;

        let bytes = Self::serialize_entry(&entry)?;
        self.id2entry
            .put(&mut wtxn, &keys::encode_id(id), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// As [`Self::modify`], but applies `mods` through
    /// [`dirsrv_core::apply_operational_modifications`] rather than
    /// [`dirsrv_core::apply_modifications`], so it can stamp
    /// NO-USER-MODIFICATION attributes. For use by the operational-
    /// attribute maintenance stage only; never route a client-issued
    /// modify request through this.
    pub fn modify_operational(
        &self,
        dn: &Dn,
        mods: &[Modification],
        schema: &SchemaRegistry,
    ) -> DirectoryResult<()> {
        let _guard = self.write_lock();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let id = self
            .id_for_dn(&wtxn, dn)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
        let mut entry = self
            .entry_for_id(&wtxn, id)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;

        self.unindex_entry_values(&mut wtxn, id, &entry, schema)?;
        dirsrv_core::apply_operational_modifications(&mut entry, mods, schema)?;
        entry.normalize(schema)?;
        self.index_entry_values(&mut wtxn, id, &entry, schema)?;

        let bytes = Self::serialize_entry(&entry)?;
        self.id2entry
            .put(&mut wtxn, &keys::encode_id(id), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    /// Rename an entry in place (same superior), optionally retiring the
    /// old RDN's values from the entry. Returns the new DN.
    pub fn rename(
        &self,
        dn: &Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        schema: &SchemaRegistry,
    ) -> DirectoryResult<Dn> {
        let parent = dn
            .parent()
            .ok_or_else(|| DirectoryError::NotAllowedOnRdn(dn.clone()))?;
        self.move_and_rename_inner(dn, &parent, Some(new_rdn), delete_old_rdn, schema)
    }

    /// Move an entry to a new superior, keeping its RDN.
    pub fn move_entry(&self, dn: &Dn, new_superior: &Dn, schema: &SchemaRegistry) -> DirectoryResult<Dn> {
        self.move_and_rename_inner(dn, new_superior, None, false, schema)
    }

    /// Move and rename an entry in one atomic step.
    pub fn move_and_rename(
        &self,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        schema: &SchemaRegistry,
    ) -> DirectoryResult<Dn> {
        self.move_and_rename_inner(dn, new_superior, Some(new_rdn), delete_old_rdn, schema)
    }

    fn move_and_rename_inner(
        &self,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: Option<Rdn>,
        delete_old_rdn: bool,
        schema: &SchemaRegistry,
    ) -> DirectoryResult<Dn> {
        let _guard = self.write_lock();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        let id = self
            .id_for_dn(&wtxn, dn)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
        let mut entry = self
            .entry_for_id(&wtxn, id)?
            .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;

        let has_children = self.scan_prefix(&wtxn, &self.children, &keys::adjacency_prefix(id))?.next().is_some();
        if has_children {
            return Err(DirectoryError::NotLeaf(dn.clone()));
        }

        if new_superior.equals(dn) || new_superior.is_descendant_of(dn) {
            return Err(DirectoryError::Unwilling(format!(
                "cannot move {dn} onto itself or one of its own descendants"
            )));
        }

        let new_superior_id = if new_superior.is_root() && new_superior.equals(&self.suffix) {
            None
        } else {
            Some(
                self.id_for_dn(&wtxn, new_superior)?
                    .ok_or_else(|| DirectoryError::NotFound(new_superior.clone()))?,
            )
        };

        let rdn = new_rdn.unwrap_or_else(|| entry.dn().leaf_rdn().cloned().unwrap_or_else(|| Rdn::from_avas(vec![])));
        let mut new_dn = new_superior.add(rdn.clone());
        new_dn.normalize(schema)?;

        if !new_dn.equals(dn) && self.id_for_dn(&wtxn, &new_dn)?.is_some() {
            return Err(DirectoryError::AlreadyExists(new_dn));
        }

        self.unindex_entry_values(&mut wtxn, id, &entry, schema)?;

        if delete_old_rdn {
            if let Some(old_rdn) = entry.dn().leaf_rdn().cloned() {
                for ava in old_rdn.avas() {
                    let _ = entry.remove_values(
                        &ava.user_attr,
                        &[dirsrv_core::AttributeValue::utf8(ava.user_value.clone())],
                        schema,
                    );
                }
            }
        }
        for ava in rdn.avas() {
            let _ = entry.add_values(
                &ava.user_attr,
                vec![dirsrv_core::AttributeValue::utf8(ava.user_value.clone())],
                schema,
            );
        }

        let old_parent = dn.parent();
        entry.set_dn(new_dn.clone());
        entry.normalize(schema)?;

        self.dn2id
            .delete(&mut wtxn, dn.to_normalized_string().as_bytes())
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        self.dn2id
            .put(&mut wtxn, new_dn.to_normalized_string().as_bytes(), &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        if let Some(old_parent) = &old_parent {
            if !dn.equals(&self.suffix) {
                if let Some(old_parent_id) = self.id_for_dn(&wtxn, old_parent)? {
                    self.children
                        .delete(&mut wtxn, &keys::encode_adjacency_key(old_parent_id, id))
                        .map_err(|e| StoreError::Transaction(e.to_string()))?;
                }
                let mut old_ancestors = self.resolve_ancestor_ids(&wtxn, dn)?;
                if let Some(old_parent_id) = self.id_for_dn(&wtxn, old_parent)? {
                    old_ancestors.push(old_parent_id);
                }
                for ancestor in old_ancestors {
                    self.sublevel
                        .delete(&mut wtxn, &keys::encode_adjacency_key(ancestor, id))
                        .map_err(|e| StoreError::Transaction(e.to_string()))?;
                }
            }
        }

        if let Some(new_superior_id) = new_superior_id {
            self.children
                .put(&mut wtxn, &keys::encode_adjacency_key(new_superior_id, id), &[])
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
            let mut new_ancestors = vec![new_superior_id];
            new_ancestors.extend(self.resolve_ancestor_ids(&wtxn, &new_dn)?);
            for ancestor in new_ancestors {
                self.sublevel
                    .put(&mut wtxn, &keys::encode_adjacency_key(ancestor, id), &[])
                    .map_err(|e| StoreError::Transaction(e.to_string()))?;
            }
        }

        self.index_entry_values(&mut wtxn, id, &entry, schema)?;
        let bytes = Self::serialize_entry(&entry)?;
        self.id2entry
            .put(&mut wtxn, &keys::encode_id(id), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(new_dn)
    }

    /// All ids immediately subordinate to `parent`, for a one-level scope
    /// search or a `list` request.
    pub fn scan_children(&self, parent: EntryId) -> DirectoryResult<VecCursor> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let ids: Vec<EntryId> = self
            .scan_prefix(&rtxn, &self.children, &keys::adjacency_prefix(parent))?
            .filter_map(|key| keys::decode_adjacency_key(&key).map(|(_, child)| child))
            .collect();
        Ok(VecCursor::new(ids))
    }

    /// All ids strictly subordinate to `ancestor`, for a subtree scope
    /// search.
    pub fn scan_subtree(&self, ancestor: EntryId) -> DirectoryResult<VecCursor> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let ids: Vec<EntryId> = self
            .scan_prefix(&rtxn, &self.sublevel, &keys::adjacency_prefix(ancestor))?
            .filter_map(|key| keys::decode_adjacency_key(&key).map(|(_, descendant)| descendant))
            .collect();
        Ok(VecCursor::new(ids))
    }

    pub fn scan_presence(&self, attr_oid: &str) -> DirectoryResult<VecCursor> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let ids: Vec<EntryId> = self
            .scan_prefix(&rtxn, &self.index, &keys::index_presence_prefix(attr_oid))?
            .filter_map(|key| keys::index_key_entry_id(&key))
            .collect();
        Ok(VecCursor::new(ids))
    }

    pub fn scan_equality(&self, attr_oid: &str, normalized_value: &str) -> DirectoryResult<VecCursor> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let ids: Vec<EntryId> = self
            .scan_prefix(&rtxn, &self.index, &keys::index_equality_prefix(attr_oid, normalized_value))?
            .filter_map(|key| keys::index_key_entry_id(&key))
            .collect();
        Ok(VecCursor::new(ids))
    }

    /// Every id in this partition, for a filter clause that can't be
    /// served from an index (substring/ordering/approx/extensible/`NOT`).
    pub fn scan_all(&self) -> DirectoryResult<VecCursor> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let iter = self
            .id2entry
            .iter(&rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let mut ids = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(|e| StoreError::Transaction(e.to_string()))?;
            if let Some(id) = keys::decode_id(key) {
                ids.push(id);
            }
        }
        Ok(VecCursor::new(ids))
    }

    /// The normalized target DN of an alias entry, or `None` if `id` names
    /// an entry that isn't an alias.
    pub fn alias_target(&self, id: EntryId) -> DirectoryResult<Option<Dn>> {
        let _guard = self.read_lock();
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let found = self
            .alias
            .get(&rtxn, &keys::encode_id(id))
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        found
            .map(|b| serde_json::from_slice(b).map_err(|e| StoreError::Deserialization(e.to_string())))
            .transpose()
            .map_err(DirectoryError::from)
    }

    fn scan_prefix(
        &self,
        rtxn: &heed::RoTxn<'_>,
        db: &Database<Bytes, Bytes>,
        prefix: &[u8],
    ) -> StoreResult<impl Iterator<Item = Vec<u8>>> {
        let iter = db
            .iter(rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let prefix = prefix.to_vec();
        let mut matches = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(|e| StoreError::Transaction(e.to_string()))?;
            if key.len() >= prefix.len() && key[..prefix.len()] == prefix[..] {
                matches.push(key.to_vec());
            }
        }
        Ok(matches.into_iter())
    }

    /// Flush pending writes to disk. A no-op beyond LMDB's own commit
    /// durability guarantees unless the environment was opened with a
    /// relaxed sync mode, kept here so callers have one place to force a
    /// checkpoint before `destroy`.
    pub fn sync(&self) -> DirectoryResult<()> {
        self.env
            .force_sync()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }
}
