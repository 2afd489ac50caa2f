//! Subentry administration (RFC 3672): subtree specifications anchored at
//! an administrative point, and the operational-attribute back-references
//! every selected entry carries to the subentries that govern it.
//!
//! A process-wide cache, keyed by normalized subentry DN, is loaded once
//! at startup (see [`SubentryInterceptor::load_cache`]) by scanning every
//! naming context for `objectClass=subentry`, then kept current
//! incrementally as subentries and the entries they select are added,
//! deleted, modified and moved through this stage.
//!
//! `collectiveAttributeSubentries` is the one administrative area with a
//! real X.501 OID; `accessControlSubentries` and
//! `triggerExecutionSubentries` aren't standardized anywhere, so this
//! deployment assigns its own attribute OIDs for them (see
//! `dirsrv_core::schema::bootstrap_registry`). The subtree specification
//! itself is stored as free text rather than the full X.501 ASN.1
//! refinement grammar: `base=<rdn-sequence-relative-to-the-administrative-point>;filter=<ldap-filter>`,
//! either half optional. That's a deliberate simplification, not a
//! parsing shortcut for a grammar this crate otherwise supports.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{
    AdministrativeRoles, AttributeValue, Dn, DirectoryError, DirectoryResult, Entry, Filter, Modification,
    SchemaRegistry,
};
use dirsrv_session::Session;
use dirsrv_store::nexus::PartitionNexus;
use dirsrv_store::search::{search, DerefAliases, ReturningAttrs, Scope, SearchRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn roles_from_entry(entry: &Entry, schema: &SchemaRegistry) -> AdministrativeRoles {
    entry
        .values("administrativeRole", schema)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| AdministrativeRoles::parse(&v.raw.as_text()))
                .fold(AdministrativeRoles::empty(), |acc, role| acc | role)
        })
        .unwrap_or_else(AdministrativeRoles::empty)
}

/// An entry that has declared itself the specific administrative point
/// for one or more roles, via its `administrativeRole` values.
pub struct SubentryAdministrationPoint {
    pub dn: Dn,
    pub roles: AdministrativeRoles,
}

impl SubentryAdministrationPoint {
    fn from_entry(dn: Dn, entry: &Entry, schema: &SchemaRegistry) -> Self {
        Self {
            dn,
            roles: roles_from_entry(entry, schema),
        }
    }
}

/// How far below the subtree specification's base a candidate may sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeScope {
    /// Only the base entry itself.
    BaseObject,
    /// The base entry's immediate children, not the base itself.
    OneLevel,
    /// The base entry and every descendant, subject to chop exclusions.
    Subtree,
}

impl SubtreeScope {
    fn parse(s: &str) -> DirectoryResult<Self> {
        match s {
            "base" => Ok(SubtreeScope::BaseObject),
            "one" => Ok(SubtreeScope::OneLevel),
            "subtree" => Ok(SubtreeScope::Subtree),
            other => Err(DirectoryError::SchemaViolation(format!(
                "unknown subtree specification scope '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubtreeSpecification {
    pub base: Dn,
    /// Exclude the named DNs and everything under them.
    pub chop_before: Vec<Dn>,
    /// Exclude everything strictly under the named DNs, but not the DNs
    /// themselves.
    pub chop_after: Vec<Dn>,
    pub filter: Option<Filter>,
    pub scope: SubtreeScope,
}

impl SubtreeSpecification {
    pub fn parse(raw: &str, administrative_point: &Dn) -> DirectoryResult<Self> {
        let mut base = administrative_point.clone();
        let mut chop_before = Vec::new();
        let mut chop_after = Vec::new();
        let mut filter = None;
        let mut scope = SubtreeScope::Subtree;
        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                DirectoryError::SchemaViolation(format!("malformed subtree specification clause '{part}'"))
            })?;
            match key.trim() {
                "base" => {
                    let value = value.trim();
                    if !value.is_empty() {
                        base = join_relative(administrative_point, value)?;
                    }
                }
                "chopBefore" => {
                    let value = value.trim();
                    if !value.is_empty() {
                        chop_before.push(join_relative(administrative_point, value)?);
                    }
                }
                "chopAfter" => {
                    let value = value.trim();
                    if !value.is_empty() {
                        chop_after.push(join_relative(administrative_point, value)?);
                    }
                }
                "scope" => {
                    scope = SubtreeScope::parse(value.trim())?;
                }
                "filter" => {
                    filter = Some(
                        dirsrv_dsl::parse_filter(value.trim())
                            .map_err(|e| DirectoryError::SchemaViolation(format!("invalid subtree filter: {e}")))?,
                    );
                }
                other => {
                    return Err(DirectoryError::SchemaViolation(format!(
                        "unknown subtree specification clause '{other}'"
                    )))
                }
            }
        }
        Ok(Self {
            base,
            chop_before,
            chop_after,
            filter,
            scope,
        })
    }

    /// Per the (base, chop-before, chop-after, filter, scope) evaluation
    /// rule: descendant of base, not chop-excluded, filter matches, scope
    /// satisfied — in that order.
    pub fn selects(&self, dn: &Dn, entry: &Entry, schema: &SchemaRegistry) -> bool {
        if !(dn.equals(&self.base) || dn.is_descendant_of(&self.base)) {
            return false;
        }
        if self.chop_before.iter().any(|chop| dn.equals(chop) || dn.is_descendant_of(chop)) {
            return false;
        }
        if self.chop_after.iter().any(|chop| dn.is_descendant_of(chop)) {
            return false;
        }
        if !self.filter.as_ref().map(|f| f.matches(entry, schema)).unwrap_or(true) {
            return false;
        }
        match self.scope {
            SubtreeScope::BaseObject => dn.equals(&self.base),
            SubtreeScope::OneLevel => dn.parent().map(|p| p.equals(&self.base)).unwrap_or(false),
            SubtreeScope::Subtree => true,
        }
    }
}

fn join_relative(administrative_point: &Dn, relative: &str) -> DirectoryResult<Dn> {
    let rel = dirsrv_dsl::parse_dn(relative)
        .map_err(|e| DirectoryError::SchemaViolation(format!("invalid subtree base '{relative}': {e}")))?;
    let mut dn = administrative_point.clone();
    for rdn in rel.rdns().iter().rev() {
        dn = dn.add(rdn.clone());
    }
    Ok(dn)
}

#[derive(Clone)]
struct CachedSubentry {
    dn: Dn,
    administrative_point: Dn,
    roles: AdministrativeRoles,
    spec: SubtreeSpecification,
}

pub struct SubentryInterceptor {
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
    cache: Mutex<HashMap<String, CachedSubentry>>,
}

impl SubentryInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        Self {
            schema,
            nexus,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Scan every mounted naming context for `objectClass=subentry` and
    /// populate the cache. Call once, after partitions are mounted and
    /// before the chain starts serving traffic.
    pub fn load_cache(&self) -> DirectoryResult<()> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
        for context in self.nexus.naming_contexts() {
            let Some(routed) = self.nexus.route(&context) else { continue };
            let results = routed.with_store(|store| {
                search(
                    store,
                    &self.schema,
                    &SearchRequest {
                        base: context.clone(),
                        scope: Scope::Subtree,
                        filter: Filter::Equality {
                            attr: "objectClass".to_string(),
                            value: "subentry".to_string(),
                        },
                        deref: DerefAliases::Never,
                        returning: ReturningAttrs::all_user_and_operational(),
                        size_limit: None,
                        time_limit: None,
                    },
                )
            })?;
            for entry in results {
                if let Some(ap) = entry.dn().parent() {
                    self.cache_subentry(&mut cache, entry.dn().clone(), ap, &entry)?;
                }
            }
        }
        Ok(())
    }

    fn cache_subentry(
        &self,
        cache: &mut HashMap<String, CachedSubentry>,
        dn: Dn,
        administrative_point: Dn,
        entry: &Entry,
    ) -> DirectoryResult<()> {
        let ap_entry = self
            .nexus
            .route(&administrative_point)
            .and_then(|r| r.with_store(|s| s.lookup(&administrative_point)).ok().flatten());
        let roles = roles_from_entry(entry, &self.schema);
        if let Some(ap_entry) = &ap_entry {
            let ap = SubentryAdministrationPoint::from_entry(administrative_point.clone(), ap_entry, &self.schema);
            if !ap.roles.intersects(roles) {
                return Err(DirectoryError::SchemaViolation(
                    "administrative point does not declare a role matching this subentry".to_string(),
                ));
            }
        }
        let raw_spec = entry
            .values("subtreeSpecification", &self.schema)
            .and_then(|v| v.first())
            .map(|v| v.raw.as_text().into_owned())
            .unwrap_or_default();
        let spec = SubtreeSpecification::parse(&raw_spec, &administrative_point)?;
        cache.insert(
            dn.to_normalized_string(),
            CachedSubentry {
                dn,
                administrative_point,
                roles,
                spec,
            },
        );
        Ok(())
    }

    fn selected_entries(&self, spec: &SubtreeSpecification) -> DirectoryResult<Vec<Entry>> {
        let Some(routed) = self.nexus.route(&spec.base) else {
            return Ok(Vec::new());
        };
        routed.with_store(|store| {
            search(
                store,
                &self.schema,
                &SearchRequest {
                    base: spec.base.clone(),
                    scope: Scope::Subtree,
                    filter: spec.filter.clone().unwrap_or(Filter::Present {
                        attr: "objectClass".to_string(),
                    }),
                    deref: DerefAliases::Never,
                    returning: ReturningAttrs::all_user(),
                    size_limit: None,
                    time_limit: None,
                },
            )
        })
    }

    fn add_reference(&self, dn: &Dn, subentry_dn: &Dn, role: AdministrativeRoles) {
        let Some(routed) = self.nexus.route(dn) else { return };
        let m = Modification::add(role.reference_attribute(), vec![AttributeValue::utf8(subentry_dn.to_user_string())]);
        if let Err(e) = routed.with_store(|s| s.modify_operational(dn, &[m], &self.schema)) {
            tracing::warn!("failed to attach subentry reference on {dn}: {e}");
        }
    }

    fn remove_reference(&self, dn: &Dn, subentry_dn: &Dn, role: AdministrativeRoles) {
        let Some(routed) = self.nexus.route(dn) else { return };
        let m = Modification::delete(role.reference_attribute(), vec![AttributeValue::utf8(subentry_dn.to_user_string())]);
        if let Err(e) = routed.with_store(|s| s.modify_operational(dn, &[m], &self.schema)) {
            tracing::warn!("failed to detach subentry reference on {dn}: {e}");
        }
    }

    fn apply_new_subentry(&self, cached: &CachedSubentry) -> DirectoryResult<()> {
        for entry in self.selected_entries(&cached.spec)? {
            for role in cached.roles.iter_roles() {
                self.add_reference(entry.dn(), &cached.dn, role);
            }
        }
        Ok(())
    }

    fn retract_subentry(&self, cached: &CachedSubentry) -> DirectoryResult<()> {
        for entry in self.selected_entries(&cached.spec)? {
            for role in cached.roles.iter_roles() {
                self.remove_reference(entry.dn(), &cached.dn, role);
            }
        }
        Ok(())
    }

    fn inject_references_for_new_entry(&self, entry: &mut Entry) {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        for cached in cache.values() {
            if cached.spec.selects(entry.dn(), entry, &self.schema) {
                for role in cached.roles.iter_roles() {
                    let _ = entry.add_values(
                        role.reference_attribute(),
                        vec![AttributeValue::utf8(cached.dn.to_user_string())],
                        &self.schema,
                    );
                }
            }
        }
    }

    fn has_administrative_descendant(&self, dn: &Dn) -> DirectoryResult<bool> {
        let Some(routed) = self.nexus.route(dn) else { return Ok(false) };
        let descendants = routed.with_store(|store| {
            search(
                store,
                &self.schema,
                &SearchRequest {
                    base: dn.clone(),
                    scope: Scope::Subtree,
                    filter: Filter::Present {
                        attr: "administrativeRole".to_string(),
                    },
                    deref: DerefAliases::Never,
                    returning: ReturningAttrs::explicit(vec![]),
                    size_limit: None,
                    time_limit: None,
                },
            )
        })?;
        Ok(descendants.iter().any(|e| !e.dn().equals(dn)))
    }
}

impl Interceptor for SubentryInterceptor {
    fn name(&self) -> &'static str {
        "subentry"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        match &mut ctx.payload {
            OperationPayload::Add { entry } => {
                if entry.is_structural_member_of("subentry") {
                    let dn = entry.dn().clone();
                    let ap = dn.parent().ok_or_else(|| DirectoryError::NotAllowedOnRdn(dn.clone()))?;
                    let entry_snapshot = entry.clone();
                    let outcome = next.proceed(ctx, session)?;
                    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    self.cache_subentry(&mut cache, dn.clone(), ap, &entry_snapshot)?;
                    let cached = cache.get(&dn.to_normalized_string()).cloned();
                    drop(cache);
                    if let Some(cached) = cached {
                        self.apply_new_subentry(&cached)?;
                    }
                    return Ok(outcome);
                }
                self.inject_references_for_new_entry(entry);
                next.proceed(ctx, session)
            }
            OperationPayload::Delete { dn } => {
                let dn = dn.clone();
                let cached = {
                    let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    cache.get(&dn.to_normalized_string()).cloned()
                };
                let outcome = next.proceed(ctx, session)?;
                if let Some(cached) = cached {
                    self.retract_subentry(&cached)?;
                    self.cache.lock().unwrap_or_else(|e| e.into_inner()).remove(&dn.to_normalized_string());
                }
                Ok(outcome)
            }
            OperationPayload::Modify { dn, changes } => {
                let dn = dn.clone();
                let key = dn.to_normalized_string();
                let is_subentry = self.cache.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&key);
                let touches_spec = changes.iter().any(|m| m.attribute == "subtreeSpecification");
                let touches_object_class = changes.iter().any(|m| m.attribute == "objectClass");

                let before = if !is_subentry && touches_object_class {
                    self.nexus.route(&dn).and_then(|r| r.with_store(|s| s.lookup(&dn)).ok().flatten())
                } else {
                    None
                };
                let old_cached = if is_subentry && touches_spec {
                    self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key).cloned()
                } else {
                    None
                };

                let outcome = next.proceed(ctx, session)?;

                if let Some(old_cached) = old_cached {
                    if let Some(refreshed) = self.nexus.route(&dn).and_then(|r| r.with_store(|s| s.lookup(&dn)).ok().flatten()) {
                        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                        self.cache_subentry(&mut cache, dn.clone(), old_cached.administrative_point.clone(), &refreshed)?;
                        let new_cached = cache.get(&key).cloned();
                        drop(cache);
                        if let Some(new_cached) = new_cached {
                            self.retract_subentry(&old_cached)?;
                            self.apply_new_subentry(&new_cached)?;
                        }
                    }
                } else if let Some(before) = before {
                    if let Some(after) = self.nexus.route(&dn).and_then(|r| r.with_store(|s| s.lookup(&dn)).ok().flatten()) {
                        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                        let cached: Vec<CachedSubentry> = cache.values().cloned().collect();
                        drop(cache);
                        for c in &cached {
                            let was = c.spec.selects(&dn, &before, &self.schema);
                            let is = c.spec.selects(&dn, &after, &self.schema);
                            if was && !is {
                                for role in c.roles.iter_roles() {
                                    self.remove_reference(&dn, &c.dn, role);
                                }
                            } else if !was && is {
                                for role in c.roles.iter_roles() {
                                    self.add_reference(&dn, &c.dn, role);
                                }
                            }
                        }
                    }
                }
                Ok(outcome)
            }
            OperationPayload::ModifyDn { dn, new_superior, .. } => {
                let old_dn = dn.clone();
                if self.has_administrative_descendant(&old_dn)? {
                    return Err(DirectoryError::Unwilling(
                        "cannot rename or move an entry with an administrative point among its descendants".to_string(),
                    ));
                }
                let key = old_dn.to_normalized_string();
                let old_cached = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key).cloned();
                let before = if old_cached.is_none() {
                    self.nexus.route(&old_dn).and_then(|r| r.with_store(|s| s.lookup(&old_dn)).ok().flatten())
                } else {
                    None
                };
                let moved_under = new_superior.clone();

                let outcome = next.proceed(ctx, session)?;

                let new_dn = match &outcome {
                    OperationOutcome::Renamed(dn) => dn.clone(),
                    _ => old_dn.clone(),
                };

                if let Some(old_cached) = old_cached {
                    let new_ap = moved_under.unwrap_or_else(|| old_cached.administrative_point.clone());
                    let raw_spec_base = if old_cached.spec.base.equals(&old_cached.administrative_point) {
                        String::new()
                    } else {
                        old_cached.spec.base.to_user_string()
                    };
                    let _ = raw_spec_base;
                    let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    cache.remove(&key);
                    let new_spec = SubtreeSpecification {
                        base: new_ap.clone(),
                        chop_before: old_cached.spec.chop_before.clone(),
                        chop_after: old_cached.spec.chop_after.clone(),
                        filter: old_cached.spec.filter.clone(),
                        scope: old_cached.spec.scope,
                    };
                    cache.insert(
                        new_dn.to_normalized_string(),
                        CachedSubentry {
                            dn: new_dn.clone(),
                            administrative_point: new_ap,
                            roles: old_cached.roles.clone(),
                            spec: new_spec,
                        },
                    );
                    drop(cache);
                    for role in old_cached.roles.iter_roles() {
                        for entry in self.selected_entries(&old_cached.spec)? {
                            self.remove_reference(entry.dn(), &old_dn, role);
                            self.add_reference(entry.dn(), &new_dn, role);
                        }
                    }
                } else if let Some(before) = before {
                    let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                    let cached: Vec<CachedSubentry> = cache.values().cloned().collect();
                    drop(cache);
                    if let Some(after) = self.nexus.route(&new_dn).and_then(|r| r.with_store(|s| s.lookup(&new_dn)).ok().flatten()) {
                        for c in &cached {
                            let was = c.spec.selects(&old_dn, &before, &self.schema);
                            let is = c.spec.selects(&new_dn, &after, &self.schema);
                            if was && !is {
                                for role in c.roles.iter_roles() {
                                    self.remove_reference(&new_dn, &c.dn, role);
                                }
                            } else if !was && is {
                                for role in c.roles.iter_roles() {
                                    self.add_reference(&new_dn, &c.dn, role);
                                }
                            }
                        }
                    }
                }
                Ok(outcome)
            }
            _ => next.proceed(ctx, session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::Entry;
    use std::str::FromStr;

    struct AlwaysOk;

    impl Interceptor for AlwaysOk {
        fn name(&self) -> &'static str {
            "always-ok"
        }

        fn invoke(
            &self,
            _ctx: &mut OperationContext,
            _session: &mut Session,
            _next: Invocation<'_>,
        ) -> DirectoryResult<OperationOutcome> {
            Ok(OperationOutcome::Modified)
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<PartitionNexus>, Arc<SchemaRegistry>) {
        let schema = Arc::new(bootstrap_registry());
        let dir = tempfile::tempdir().unwrap();
        let suffix = Dn::from_str("dc=example").unwrap();
        let store = dirsrv_store::PartitionStore::open(dir.path(), suffix.clone()).unwrap();
        let nexus = PartitionNexus::new();
        nexus.mount(suffix, store);
        (dir, Arc::new(nexus), schema)
    }

    #[test]
    fn subtree_specification_parses_base_and_filter() {
        let ap = Dn::from_str("dc=example").unwrap();
        let spec = SubtreeSpecification::parse("base=ou=people;filter=(objectClass=person)", &ap).unwrap();
        assert_eq!(spec.base, Dn::from_str("ou=people,dc=example").unwrap());
        assert!(spec.filter.is_some());
        assert!(spec.chop_before.is_empty());
        assert!(spec.chop_after.is_empty());
        assert_eq!(spec.scope, SubtreeScope::Subtree);
    }

    #[test]
    fn subtree_specification_parses_scope_and_chops() {
        let ap = Dn::from_str("dc=example").unwrap();
        let spec = SubtreeSpecification::parse(
            "base=ou=people;scope=one;chopBefore=ou=contractors,ou=people;chopAfter=ou=archived,ou=people",
            &ap,
        )
        .unwrap();
        assert_eq!(spec.scope, SubtreeScope::OneLevel);
        assert_eq!(spec.chop_before, vec![Dn::from_str("ou=contractors,ou=people,dc=example").unwrap()]);
        assert_eq!(spec.chop_after, vec![Dn::from_str("ou=archived,ou=people,dc=example").unwrap()]);
    }

    #[test]
    fn chop_before_excludes_itself_and_its_descendants() {
        let ap = Dn::from_str("dc=example").unwrap();
        let spec = SubtreeSpecification::parse("base=ou=people;chopBefore=ou=contractors,ou=people", &ap).unwrap();
        let schema = bootstrap_registry();
        let chop = Dn::from_str("ou=contractors,ou=people,dc=example").unwrap();
        let inside_chop = Dn::from_str("cn=bob,ou=contractors,ou=people,dc=example").unwrap();
        let sibling = Dn::from_str("cn=alice,ou=people,dc=example").unwrap();
        let mut entry = Entry::new(sibling.clone());
        entry.add_values("objectClass", vec![AttributeValue::utf8("top")], &schema).unwrap();
        assert!(!spec.selects(&chop, &entry, &schema));
        assert!(!spec.selects(&inside_chop, &entry, &schema));
        assert!(spec.selects(&sibling, &entry, &schema));
    }

    #[test]
    fn chop_after_excludes_descendants_but_not_itself() {
        let ap = Dn::from_str("dc=example").unwrap();
        let spec = SubtreeSpecification::parse("base=ou=people;chopAfter=ou=archived,ou=people", &ap).unwrap();
        let schema = bootstrap_registry();
        let chop = Dn::from_str("ou=archived,ou=people,dc=example").unwrap();
        let inside_chop = Dn::from_str("cn=bob,ou=archived,ou=people,dc=example").unwrap();
        let mut entry = Entry::new(chop.clone());
        entry.add_values("objectClass", vec![AttributeValue::utf8("top")], &schema).unwrap();
        assert!(spec.selects(&chop, &entry, &schema));
        assert!(!spec.selects(&inside_chop, &entry, &schema));
    }

    #[test]
    fn one_level_scope_only_selects_immediate_children() {
        let ap = Dn::from_str("dc=example").unwrap();
        let spec = SubtreeSpecification::parse("base=ou=people;scope=one", &ap).unwrap();
        let schema = bootstrap_registry();
        let base = Dn::from_str("ou=people,dc=example").unwrap();
        let child = Dn::from_str("cn=alice,ou=people,dc=example").unwrap();
        let grandchild = Dn::from_str("cn=x,cn=alice,ou=people,dc=example").unwrap();
        let mut entry = Entry::new(child.clone());
        entry.add_values("objectClass", vec![AttributeValue::utf8("top")], &schema).unwrap();
        assert!(!spec.selects(&base, &entry, &schema));
        assert!(spec.selects(&child, &entry, &schema));
        assert!(!spec.selects(&grandchild, &entry, &schema));
    }

    #[test]
    fn new_entry_under_a_cached_subentry_gets_the_reference_injected() {
        let (_dir, nexus, schema) = fixture();
        let ap_dn = Dn::from_str("dc=example").unwrap();
        nexus
            .route(&ap_dn)
            .unwrap()
            .with_store(|s| {
                let mut ap = Entry::new(ap_dn.clone());
                ap.add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("organization")], &schema)
                    .unwrap();
                ap.add_values("o", vec![AttributeValue::utf8("example")], &schema).unwrap();
                ap.add_values("administrativeRole", vec![AttributeValue::utf8("collectiveAttributeSpecificArea")], &schema)
                    .unwrap();
                s.add(ap, &schema)
            })
            .unwrap();

        let interceptor = SubentryInterceptor::new(schema.clone(), nexus.clone());
        let mut cache = interceptor.cache.lock().unwrap();
        let subentry_dn = Dn::from_str("cn=policy,dc=example").unwrap();
        let mut subentry = Entry::new(subentry_dn.clone());
        subentry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("subentry")], &schema)
            .unwrap();
        subentry.add_values("cn", vec![AttributeValue::utf8("policy")], &schema).unwrap();
        subentry
            .add_values("subtreeSpecification", vec![AttributeValue::utf8("")], &schema)
            .unwrap();
        subentry
            .add_values("administrativeRole", vec![AttributeValue::utf8("collectiveAttributeSpecificArea")], &schema)
            .unwrap();
        interceptor.cache_subentry(&mut cache, subentry_dn.clone(), ap_dn.clone(), &subentry).unwrap();
        drop(cache);

        let chain = crate::ChainBuilder::new().push(interceptor).terminal(AlwaysOk);
        let dn = Dn::from_str("cn=bob,dc=example").unwrap();
        let mut entry = Entry::new(dn);
        entry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")], &schema)
            .unwrap();
        entry.add_values("cn", vec![AttributeValue::utf8("bob")], &schema).unwrap();
        entry.add_values("sn", vec![AttributeValue::utf8("b")], &schema).unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let OperationPayload::Add { entry } = &ctx.payload else {
            panic!("payload changed kind");
        };
        assert!(entry.has_attribute("collectiveAttributeSubentries", &schema));
    }
}
