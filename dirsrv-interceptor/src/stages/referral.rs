//! Checks whether the operation's target (or an ancestor of it) is a
//! knowledge reference to another server (RFC 4511 §4.1.10, RFC 3296) and
//! turns that into a [`dirsrv_core::DirectoryError::Referral`] instead of
//! letting the operation run against a `referral` entry as though it were
//! real data.
//!
//! `manageDsaIT` (RFC 3296 §3) suppresses this entirely: a client that
//! sets it wants to see and manipulate referral entries directly.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::OperationContext;
use dirsrv_core::{Dn, DirectoryError, DirectoryResult, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::sync::Arc;

pub struct ReferralInterceptor {
    schema: Option<Arc<SchemaRegistry>>,
    nexus: Option<Arc<PartitionNexus>>,
}

impl ReferralInterceptor {
    /// Without a nexus attached, this stage is a no-op pass-through; a
    /// chain built by [`crate::default_chain`] always wires one in, but
    /// tests that don't care about referrals can skip it.
    pub fn new() -> Self {
        Self {
            schema: None,
            nexus: None,
        }
    }

    pub fn with_nexus(mut self, schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        self.schema = Some(schema);
        self.nexus = Some(nexus);
        self
    }
}

impl Default for ReferralInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for ReferralInterceptor {
    fn name(&self) -> &'static str {
        "referral"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        if !ctx.manage_dsa_it {
            if let (Some(schema), Some(nexus)) = (&self.schema, &self.nexus) {
                if let Some(dn) = ctx.target_dn() {
                    let exclude_self = matches!(
                        ctx.payload,
                        dirsrv_context::OperationPayload::Add { .. }
                    );
                    if let Some(urls) = referral_urls(nexus, dn, schema, exclude_self)? {
                        return Err(DirectoryError::Referral { urls });
                    }
                }
            }
        }
        next.proceed(ctx, session)
    }
}

/// Walk from `dn` up to the root, returning the `ref` values of the first
/// `referral`-classed entry found. `exclude_self` skips `dn` itself (an
/// `add` targets a not-yet-existing child of a referral, which is still a
/// referral condition, but the add's own target can't itself be checked
/// since it doesn't exist yet).
fn referral_urls(
    nexus: &PartitionNexus,
    dn: &Dn,
    schema: &SchemaRegistry,
    exclude_self: bool,
) -> DirectoryResult<Option<Vec<String>>> {
    let mut candidate = dn.clone();
    let mut first = true;
    loop {
        let skip = first && exclude_self;
        first = false;
        if !skip {
            if let Some(routed) = nexus.route(&candidate) {
                let looked_up: Option<dirsrv_core::Entry> = routed.with_store(|s| s.lookup(&candidate))?;
                if let Some(entry) = looked_up {
                    if entry.is_structural_member_of("referral") {
                        let urls = entry
                            .values("ref", schema)
                            .map(|values| values.iter().map(|v| v.raw.as_text().into_owned()).collect())
                            .unwrap_or_default();
                        return Ok(Some(urls));
                    }
                }
            }
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_context::OperationPayload;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{AttributeValue, Entry};
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
            Ok(OperationOutcome::Compared(true))
        }
    }

    fn nexus_with(dn: &str, entry_builder: impl FnOnce(&mut Entry)) -> (tempfile::TempDir, Arc<PartitionNexus>, Arc<SchemaRegistry>) {
        let schema = Arc::new(bootstrap_registry());
        let dir = tempfile::tempdir().unwrap();
        let suffix = Dn::from_str("dc=example").unwrap();
        let store = dirsrv_store::PartitionStore::open(dir.path(), suffix.clone()).unwrap();
        let nexus = PartitionNexus::new();
        nexus.mount(suffix, store);
        let nexus = Arc::new(nexus);
        let target = Dn::from_str(dn).unwrap();
        let mut entry = Entry::new(target);
        entry_builder(&mut entry);
        entry.normalize(&schema).unwrap();
        nexus.route(entry.dn()).unwrap().with_store(|s| s.add(entry, &schema)).unwrap();
        (dir, nexus, schema)
    }

    #[test]
    fn referral_entry_short_circuits_with_urls() {
        let (_dir, nexus, schema) = nexus_with("dc=example", |e| {
            e.add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("referral")], &bootstrap_registry()).unwrap();
            e.add_values("ref", vec![AttributeValue::utf8("ldap://other.example.com/dc=example")], &bootstrap_registry()).unwrap();
        });
        let chain = crate::ChainBuilder::new()
            .push(ReferralInterceptor::new().with_nexus(schema, nexus))
            .terminal(AlwaysOk);
        let mut ctx = OperationContext::new(OperationPayload::Compare {
            dn: Dn::from_str("dc=example").unwrap(),
            attribute: "cn".to_string(),
            value: "x".to_string(),
        });
        let mut session = Session::anonymous();
        let result = chain.dispatch(&mut ctx, &mut session);
        match result {
            Err(DirectoryError::Referral { urls }) => {
                assert_eq!(urls, vec!["ldap://other.example.com/dc=example".to_string()])
            }
            other => panic!("expected referral, got {other:?}"),
        }
    }

    #[test]
    fn manage_dsa_it_suppresses_referral_handling() {
        let (_dir, nexus, schema) = nexus_with("dc=example", |e| {
            e.add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("referral")], &bootstrap_registry()).unwrap();
            e.add_values("ref", vec![AttributeValue::utf8("ldap://other.example.com/")], &bootstrap_registry()).unwrap();
        });
        let chain = crate::ChainBuilder::new()
            .push(ReferralInterceptor::new().with_nexus(schema, nexus))
            .terminal(AlwaysOk);
        let mut ctx = OperationContext::new(OperationPayload::Compare {
            dn: Dn::from_str("dc=example").unwrap(),
            attribute: "cn".to_string(),
            value: "x".to_string(),
        });
        ctx.manage_dsa_it = true;
        let mut session = Session::anonymous();
        assert!(chain.dispatch(&mut ctx, &mut session).is_ok());
    }
}
