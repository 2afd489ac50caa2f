//! The terminal stage: the only one that actually talks to a
//! [`PartitionNexus`]. Every payload kind is dispatched here into the
//! matching [`dirsrv_store::PartitionStore`] call, and the root DSE
//! (a base-scope search against the empty DN) is synthesized without
//! touching any partition at all.
//!
//! Subentries are hidden from one-level and subtree search results
//! unless the request carries the subentries visibility control (RFC
//! 3672 section 5.1); a base-scope search that explicitly names a
//! subentry always returns it, matching the rule that naming something
//! directly is never itself "browsing".

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{AliasDereferencing, OperationContext, OperationPayload, SearchScope};
use dirsrv_core::{DirectoryError, DirectoryResult, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::search::{search, DerefAliases, ReturningAttrs, Scope, SearchRequest};
use dirsrv_store::PartitionNexus;
use std::sync::Arc;

/// RFC 3672 section 5.1.
const SUBENTRIES_CONTROL_OID: &str = "1.3.6.1.4.1.4203.1.10.1";

fn translate_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn translate_deref(mode: AliasDereferencing) -> DerefAliases {
    match mode {
        AliasDereferencing::Never => DerefAliases::Never,
        AliasDereferencing::FindingBaseOnly => DerefAliases::FindingBaseOnly,
        AliasDereferencing::SearchingOnly => DerefAliases::InSearching,
        AliasDereferencing::Always => DerefAliases::Always,
    }
}

pub struct NexusInterceptor {
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
}

impl NexusInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        Self { schema, nexus }
    }
}

impl Interceptor for NexusInterceptor {
    fn name(&self) -> &'static str {
        "nexus"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        _session: &mut Session,
        _next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        match &ctx.payload {
            OperationPayload::Bind { .. } => Ok(OperationOutcome::Bound),
            OperationPayload::Unbind => Ok(OperationOutcome::Unbound),
            OperationPayload::Add { entry } => {
                let routed = self
                    .nexus
                    .route(entry.dn())
                    .ok_or_else(|| DirectoryError::NotFound(entry.dn().clone()))?;
                let id = routed.with_store(|s| s.add(entry.clone(), &self.schema))?;
                Ok(OperationOutcome::Added(id))
            }
            OperationPayload::Delete { dn } => {
                let routed = self.nexus.route(dn).ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
                routed.with_store(|s| s.delete(dn, &self.schema))?;
                Ok(OperationOutcome::Deleted)
            }
            OperationPayload::Modify { dn, changes } => {
                let routed = self.nexus.route(dn).ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
                routed.with_store(|s| s.modify(dn, changes, &self.schema))?;
                Ok(OperationOutcome::Modified)
            }
            OperationPayload::ModifyDn {
                dn,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => {
                let routed = self.nexus.route(dn).ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
                let new_dn = match new_superior {
                    Some(new_superior) => {
                        routed.with_store(|s| s.move_and_rename(dn, new_superior, new_rdn.clone(), *delete_old_rdn, &self.schema))?
                    }
                    None => routed.with_store(|s| s.rename(dn, new_rdn.clone(), *delete_old_rdn, &self.schema))?,
                };
                Ok(OperationOutcome::Renamed(new_dn))
            }
            OperationPayload::Compare { dn, attribute, value } => {
                let routed = self.nexus.route(dn).ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
                let entry = routed
                    .with_store(|s| s.lookup(dn))?
                    .ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
                let matched = entry
                    .values(attribute, &self.schema)
                    .map(|values| values.iter().any(|v| v.raw.as_text() == *value))
                    .unwrap_or(false);
                Ok(OperationOutcome::Compared(matched))
            }
            OperationPayload::Search {
                base,
                scope,
                filter,
                attributes,
                types_only: _,
            } => {
                if base.is_root() && matches!(scope, SearchScope::Base) {
                    return Ok(OperationOutcome::SearchResults(vec![self.nexus.root_dse(&self.schema)?]));
                }
                let Some(routed) = self.nexus.route(base) else {
                    return Err(DirectoryError::NotFound(base.clone()));
                };
                let returning = if attributes.is_empty() {
                    ReturningAttrs::all_user()
                } else {
                    ReturningAttrs::explicit(attributes.clone())
                };
                let mut results = routed.with_store(|s| {
                    search(
                        s,
                        &self.schema,
                        &SearchRequest {
                            base: base.clone(),
                            scope: translate_scope(*scope),
                            filter: filter.clone(),
                            deref: translate_deref(ctx.alias_dereferencing),
                            returning,
                            size_limit: ctx.size_limit.map(|n| n as usize),
                            time_limit: ctx.time_limit,
                        },
                    )
                })?;
                if !matches!(scope, SearchScope::Base) && ctx.control(SUBENTRIES_CONTROL_OID).is_none() {
                    results.retain(|e| !e.is_structural_member_of("subentry"));
                }
                Ok(OperationOutcome::SearchResults(results))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{AttributeValue, Dn, Entry, Filter};
    use dirsrv_store::PartitionStore;
    use std::str::FromStr;

    fn fixture() -> (tempfile::TempDir, Arc<PartitionNexus>, Arc<SchemaRegistry>) {
        let schema = Arc::new(bootstrap_registry());
        let dir = tempfile::tempdir().unwrap();
        let suffix = Dn::from_str("dc=example").unwrap();
        let store = PartitionStore::open(dir.path(), suffix.clone()).unwrap();
        let nexus = PartitionNexus::new();
        nexus.mount(suffix, store);
        (dir, Arc::new(nexus), schema)
    }

    #[test]
    fn add_then_search_round_trips() {
        let (_dir, nexus, schema) = fixture();
        let interceptor = NexusInterceptor::new(schema.clone(), nexus.clone());
        let dn = Dn::from_str("dc=example").unwrap();
        let mut entry = Entry::new(dn.clone());
        entry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("domain")], &schema)
            .unwrap();
        entry.add_values("dc", vec![AttributeValue::utf8("example")], &schema).unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        let chain = crate::ChainBuilder::new().terminal(interceptor);
        let outcome = chain.dispatch(&mut ctx, &mut session).unwrap();
        assert!(matches!(outcome, OperationOutcome::Added(_)));
    }

    #[test]
    fn subentries_are_hidden_from_subtree_search_by_default() {
        let (_dir, nexus, schema) = fixture();
        let suffix = Dn::from_str("dc=example").unwrap();
        nexus
            .route(&suffix)
            .unwrap()
            .with_store(|s| {
                let mut base = Entry::new(suffix.clone());
                base.add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("domain")], &schema)
                    .unwrap();
                base.add_values("dc", vec![AttributeValue::utf8("example")], &schema).unwrap();
                s.add(base, &schema)
            })
            .unwrap();
        let sub_dn = Dn::from_str("cn=policy,dc=example").unwrap();
        nexus
            .route(&sub_dn)
            .unwrap()
            .with_store(|s| {
                let mut sub = Entry::new(sub_dn.clone());
                sub.add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("subentry")], &schema)
                    .unwrap();
                sub.add_values("cn", vec![AttributeValue::utf8("policy")], &schema).unwrap();
                sub.add_values("subtreeSpecification", vec![AttributeValue::utf8("")], &schema).unwrap();
                s.add(sub, &schema)
            })
            .unwrap();

        let interceptor = NexusInterceptor::new(schema, nexus);
        let chain = crate::ChainBuilder::new().terminal(interceptor);
        let mut ctx = OperationContext::new(OperationPayload::Search {
            base: suffix,
            scope: SearchScope::Subtree,
            filter: Filter::Present { attr: "objectClass".to_string() },
            attributes: vec![],
            types_only: false,
        });
        let mut session = Session::anonymous();
        let outcome = chain.dispatch(&mut ctx, &mut session).unwrap();
        let OperationOutcome::SearchResults(results) = outcome else {
            panic!("expected search results");
        };
        assert_eq!(results.len(), 1);
    }
}
