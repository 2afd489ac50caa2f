//! Collective attributes (X.501 §8.9.3 / RFC 3671): for each entry a
//! search returns, merges in the values contributed by the
//! `collectiveAttributeSubentries` it carries, unless
//! `collectiveAttributeSubentries` suppression (a `collectiveExclusions`
//! value naming the attribute) applies on that particular entry. Nothing
//! here ever persists a collective value on a regular entry — they exist
//! only in the response this stage builds.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::OperationContext;
use dirsrv_core::{AttributeValue, Dn, DirectoryResult, Entry, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CollectiveAttributeInterceptor {
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
}

impl CollectiveAttributeInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        Self { schema, nexus }
    }

    fn collective_values(&self, subentry_dn: &Dn) -> HashMap<String, Vec<AttributeValue>> {
        let mut out = HashMap::new();
        let Some(routed) = self.nexus.route(subentry_dn) else {
            return out;
        };
        let Ok(Some(subentry)) = routed.with_store(|s| s.lookup(subentry_dn)) else {
            return out;
        };
        for at in self.schema.attribute_types().filter(|at| at.collective) {
            if let Some(values) = subentry.values(&at.oid, &self.schema) {
                out.insert(at.oid.clone(), values.to_vec());
            }
        }
        out
    }

    fn merge(&self, entry: &mut Entry) {
        let Some(refs) = entry.values("collectiveAttributeSubentries", &self.schema) else {
            return;
        };
        let subentry_dns: Vec<Dn> = refs
            .iter()
            .filter_map(|v| dirsrv_dsl::parse_dn(&v.raw.as_text()).ok())
            .collect();
        let excluded: std::collections::HashSet<String> = entry
            .values("collectiveExclusions", &self.schema)
            .map(|values| values.iter().map(|v| v.raw.as_text().into_owned()).collect())
            .unwrap_or_default();
        if excluded.iter().any(|v| v == "excludeAllCollectiveAttributes") {
            return;
        }
        for subentry_dn in &subentry_dns {
            for (oid, values) in self.collective_values(subentry_dn) {
                let name = self
                    .schema
                    .attribute_type(&oid)
                    .map(|at| at.primary_name().to_string())
                    .unwrap_or(oid.clone());
                if excluded.contains(&name) || entry.has_attribute(&oid, &self.schema) {
                    continue;
                }
                let _ = entry.add_values(&oid, values, &self.schema);
            }
        }
    }
}

impl Interceptor for CollectiveAttributeInterceptor {
    fn name(&self) -> &'static str {
        "collective-attribute"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        let outcome = next.proceed(ctx, session)?;
        match outcome {
            OperationOutcome::SearchResults(mut entries) => {
                for entry in &mut entries {
                    self.merge(entry);
                }
                Ok(OperationOutcome::SearchResults(entries))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_context::{OperationPayload, SearchScope};
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::Filter;
    use std::str::FromStr;

    struct ReturnEntries(Vec<Entry>);

    impl Interceptor for ReturnEntries {
        fn name(&self) -> &'static str {
            "terminal"
        }

        fn invoke(
            &self,
            _ctx: &mut OperationContext,
            _session: &mut Session,
            _next: Invocation<'_>,
        ) -> DirectoryResult<OperationOutcome> {
            Ok(OperationOutcome::SearchResults(self.0.clone()))
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
    fn entry_without_subentry_refs_is_untouched() {
        let (_dir, nexus, schema) = fixture();
        let interceptor = CollectiveAttributeInterceptor::new(schema.clone(), nexus);
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let mut entry = Entry::new(dn);
        entry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")], &schema)
            .unwrap();
        entry.add_values("cn", vec![AttributeValue::utf8("alice")], &schema).unwrap();
        entry.add_values("sn", vec![AttributeValue::utf8("a")], &schema).unwrap();
        let chain = crate::ChainBuilder::new()
            .push(interceptor)
            .terminal(ReturnEntries(vec![entry.clone()]));
        let mut ctx = OperationContext::new(OperationPayload::Search {
            base: Dn::from_str("dc=example").unwrap(),
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
        assert_eq!(results[0].values("cn", &schema).unwrap().len(), 1);
    }
}
