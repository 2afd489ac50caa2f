//! The partition nexus: routes a DN to the partition authoritative for it
//! and synthesizes the root DSE.
//!
//! A nexus holds no data of its own beyond the routing table; every read
//! or write it dispatches ends up calling straight through to a
//! [`PartitionStore`]. Routing is by longest matching suffix so that a
//! deeper partition mounted under a shallower one (`ou=people,dc=example,dc=com`
//! under `dc=example,dc=com`) shadows it correctly.

use crate::error::StoreError;
use crate::partition::PartitionStore;
use dirsrv_core::{AttributeValue, Dn, DirectoryError, DirectoryResult, Entry, SchemaRegistry};
use std::collections::HashMap;
use std::sync::RwLock;

/// One mounted partition: its suffix and the store backing it.
struct Mount {
    suffix: Dn,
    store: PartitionStore,
}

/// Routes operations to the partition whose suffix is the longest ancestor
/// of the target DN, and answers root DSE queries (an empty-DN search)
/// without involving any partition at all.
pub struct PartitionNexus {
    mounts: RwLock<Vec<Mount>>,
    supported_controls: Vec<String>,
    supported_extensions: Vec<String>,
    supported_sasl_mechanisms: Vec<String>,
}

impl PartitionNexus {
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
            supported_controls: Vec::new(),
            supported_extensions: Vec::new(),
            supported_sasl_mechanisms: Vec::new(),
        }
    }

    /// Declare the controls, extensions and SASL mechanisms this server
    /// advertises, surfaced on the root DSE. Called once at startup by the
    /// component that owns the interceptor chain, since that's what knows
    /// which controls are actually wired up.
    pub fn with_capabilities(
        mut self,
        controls: Vec<String>,
        extensions: Vec<String>,
        sasl_mechanisms: Vec<String>,
    ) -> Self {
        self.supported_controls = controls;
        self.supported_extensions = extensions;
        self.supported_sasl_mechanisms = sasl_mechanisms;
        self
    }

    /// Mount a partition at `suffix`, backed by `store`. The store's own
    /// suffix must match; a mismatch is a programmer error in the caller
    /// wiring configuration to stores, not a runtime condition worth a
    /// soft error.
    pub fn mount(&self, suffix: Dn, store: PartitionStore) {
        assert!(
            store.suffix().equals(&suffix),
            "partition store suffix does not match the mount point it's being added under"
        );
        let mut mounts = self.mounts.write().unwrap_or_else(|e| e.into_inner());
        mounts.retain(|m| !m.suffix.equals(&suffix));
        tracing::info!(suffix = %suffix, "mounted partition");
        mounts.push(Mount { suffix, store });
    }

    /// Unmount the partition at `suffix`, flushing it to disk first so a
    /// subsequent remount (or process exit) doesn't lose buffered writes.
    pub fn unmount(&self, suffix: &Dn) -> DirectoryResult<()> {
        let mut mounts = self.mounts.write().unwrap_or_else(|e| e.into_inner());
        let Some(idx) = mounts.iter().position(|m| m.suffix.equals(suffix)) else {
            return Err(DirectoryError::NotFound(suffix.clone()));
        };
        mounts[idx].store.sync()?;
        mounts.remove(idx);
        tracing::info!(suffix = %suffix, "unmounted partition");
        Ok(())
    }

    /// The naming contexts currently mounted, in mount order.
    pub fn naming_contexts(&self) -> Vec<Dn> {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        mounts.iter().map(|m| m.suffix.clone()).collect()
    }

    /// Route `dn` to its authoritative partition by longest matching
    /// suffix. `None` means no mounted partition is authoritative for it
    /// (including the case where `dn` names the root DSE itself).
    pub fn route<'a>(&'a self, dn: &Dn) -> Option<RoutedPartition<'a>> {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        let idx = mounts
            .iter()
            .enumerate()
            .filter(|(_, m)| m.suffix.is_ancestor_of(dn) || m.suffix.equals(dn))
            .max_by_key(|(_, m)| m.suffix.size())
            .map(|(i, _)| i)?;
        Some(RoutedPartition {
            nexus: self,
            index: idx,
        })
    }

    fn with_mount<T>(&self, index: usize, f: impl FnOnce(&PartitionStore) -> T) -> T {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        f(&mounts[index].store)
    }

    /// Synthesize the root DSE: a DN-less pseudo-entry listing every
    /// mounted naming context and this server's advertised capabilities.
    /// Per RFC 4512 section 5.1, it's reachable only by a base-scope
    /// search against the empty DN, never by name elsewhere in the tree.
    pub fn root_dse(&self, schema: &SchemaRegistry) -> DirectoryResult<Entry> {
        let mut entry = Entry::new(Dn::root());
        entry.add_values(
            "objectClass",
            vec![AttributeValue::utf8("top".to_string())],
            schema,
        )?;
        let contexts: Vec<AttributeValue> = self
            .naming_contexts()
            .into_iter()
            .map(|dn| AttributeValue::utf8(dn.to_user_string()))
            .collect();
        if !contexts.is_empty() {
            entry.add_values("namingContexts", contexts, schema)?;
        }
        entry.add_values(
            "supportedLDAPVersion",
            vec![AttributeValue::utf8("3".to_string())],
            schema,
        )?;
        if !self.supported_controls.is_empty() {
            entry.add_values(
                "supportedControl",
                self.supported_controls
                    .iter()
                    .map(|oid| AttributeValue::utf8(oid.clone()))
                    .collect(),
                schema,
            )?;
        }
        if !self.supported_extensions.is_empty() {
            entry.add_values(
                "supportedExtension",
                self.supported_extensions
                    .iter()
                    .map(|oid| AttributeValue::utf8(oid.clone()))
                    .collect(),
                schema,
            )?;
        }
        if !self.supported_sasl_mechanisms.is_empty() {
            entry.add_values(
                "supportedSASLMechanisms",
                self.supported_sasl_mechanisms
                    .iter()
                    .map(|name| AttributeValue::utf8(name.clone()))
                    .collect(),
                schema,
            )?;
        }
        Ok(entry)
    }
}

impl Default for PartitionNexus {
    fn default() -> Self {
        Self::new()
    }
}

/// A partition resolved by [`PartitionNexus::route`], borrowed for the
/// duration of one operation.
pub struct RoutedPartition<'a> {
    nexus: &'a PartitionNexus,
    index: usize,
}

impl<'a> RoutedPartition<'a> {
    pub fn suffix(&self) -> Dn {
        self.nexus
            .with_mount(self.index, |store| store.suffix().clone())
    }

    pub fn with_store<T>(&self, f: impl FnOnce(&PartitionStore) -> T) -> T {
        self.nexus.with_mount(self.index, f)
    }
}

/// Build the routing-table entries for a full [`dirsrv_core::DirectoryConfig`],
/// opening one [`PartitionStore`] per configured partition.
pub fn nexus_from_config(
    config: &dirsrv_core::DirectoryConfig,
    schema: &SchemaRegistry,
) -> DirectoryResult<PartitionNexus> {
    let _ = schema;
    let nexus = PartitionNexus::new();
    let mut seen: HashMap<String, ()> = HashMap::new();
    for partition in &config.partitions {
        let mut suffix = dirsrv_dsl::parse_dn(&partition.suffix)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        suffix
            .normalize(schema)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let key = suffix.to_normalized_string();
        if seen.insert(key, ()).is_some() {
            return Err(DirectoryError::Internal(format!(
                "duplicate partition suffix '{}'",
                partition.suffix
            )));
        }
        let store = PartitionStore::open(&partition.data_dir, suffix.clone())
            .map_err(DirectoryError::from)?
            .with_indexed_attributes(partition.indexed_attributes.clone());
        nexus.mount(suffix, store);
    }
    Ok(nexus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use std::str::FromStr;

    fn store(suffix: &str) -> (tempfile::TempDir, PartitionStore) {
        let dir = tempfile::tempdir().unwrap();
        let dn = Dn::from_str(suffix).unwrap();
        let store = PartitionStore::open(dir.path(), dn).unwrap();
        (dir, store)
    }

    #[test]
    fn routes_to_longest_matching_suffix() {
        let nexus = PartitionNexus::new();
        let (_d1, s1) = store("dc=example,dc=com");
        let (_d2, s2) = store("ou=people,dc=example,dc=com");
        nexus.mount(Dn::from_str("dc=example,dc=com").unwrap(), s1);
        nexus.mount(Dn::from_str("ou=people,dc=example,dc=com").unwrap(), s2);

        let target = Dn::from_str("cn=alice,ou=people,dc=example,dc=com").unwrap();
        let routed = nexus.route(&target).expect("routed");
        assert!(routed.suffix().equals(&Dn::from_str("ou=people,dc=example,dc=com").unwrap()));

        let other = Dn::from_str("ou=groups,dc=example,dc=com").unwrap();
        let routed = nexus.route(&other).expect("routed");
        assert!(routed.suffix().equals(&Dn::from_str("dc=example,dc=com").unwrap()));
    }

    #[test]
    fn unmounted_dn_routes_to_nothing() {
        let nexus = PartitionNexus::new();
        let (_d1, s1) = store("dc=example,dc=com");
        nexus.mount(Dn::from_str("dc=example,dc=com").unwrap(), s1);
        let other = Dn::from_str("dc=other,dc=net").unwrap();
        assert!(nexus.route(&other).is_none());
    }

    #[test]
    fn root_dse_lists_naming_contexts_and_capabilities() {
        let schema = bootstrap_registry();
        let nexus = PartitionNexus::new().with_capabilities(
            vec!["1.2.840.113556.1.4.319".to_string()],
            vec![],
            vec!["EXTERNAL".to_string()],
        );
        let (_d1, s1) = store("dc=example,dc=com");
        nexus.mount(Dn::from_str("dc=example,dc=com").unwrap(), s1);

        let dse = nexus.root_dse(&schema).unwrap();
        let contexts = dse.values("namingContexts", &schema).unwrap();
        assert_eq!(contexts.len(), 1);
        let sasl = dse.values("supportedSASLMechanisms", &schema).unwrap();
        assert_eq!(sasl.len(), 1);
    }

    #[test]
    fn unmount_flushes_and_removes() {
        let nexus = PartitionNexus::new();
        let (_d1, s1) = store("dc=example,dc=com");
        let suffix = Dn::from_str("dc=example,dc=com").unwrap();
        nexus.mount(suffix.clone(), s1);
        assert!(nexus.route(&suffix).is_some());
        nexus.unmount(&suffix).unwrap();
        assert!(nexus.route(&suffix).is_none());
    }
}
