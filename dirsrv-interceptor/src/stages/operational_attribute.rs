//! Maintains the attributes the server owns on every entry:
//! `creatorsName`/`createTimestamp` on add, `modifiersName`/
//! `modifyTimestamp`/`entryCSN` on every mutation, `entryUUID` once on
//! add. All six are NO-USER-MODIFICATION (RFC 4512 section 3.4); a client
//! that supplies one directly on `add` is rejected here rather than
//! silently overwritten, and a client that targets one with a `modify` is
//! rejected downstream by [`dirsrv_core::apply_modifications`] itself.
//!
//! Runs before the schema stage so the freshly stamped attributes are
//! present by the time schema validation sees the entry, and after change
//! logging so the record reflects what the client actually asked for.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{AttributeValue, CsnFactory, DirectoryError, DirectoryResult, Dn, EntryUuid, Modification, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::sync::Arc;

/// Names of the six attributes this stage owns; a client supplying any of
/// these directly on `add` is a schema violation.
const OWNED_ATTRIBUTES: &[&str] = &[
    "creatorsName",
    "createTimestamp",
    "modifiersName",
    "modifyTimestamp",
    "entryUUID",
    "entryCSN",
];

pub struct OperationalAttributeInterceptor {
    schema: Arc<SchemaRegistry>,
    csn_factory: Arc<CsnFactory>,
    nexus: Option<Arc<PartitionNexus>>,
}

impl OperationalAttributeInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>, csn_factory: Arc<CsnFactory>) -> Self {
        Self {
            schema,
            csn_factory,
            nexus: None,
        }
    }

    /// Without a nexus, `modifyTimestamp`/`modifiersName`/`entryCSN`
    /// maintenance after a successful `modify`/`modifyDn` is skipped (the
    /// stage still stamps `add`, since that only touches the in-flight
    /// entry). A chain built by [`crate::default_chain`] always wires one
    /// in.
    pub fn with_nexus(mut self, nexus: Arc<PartitionNexus>) -> Self {
        self.nexus = Some(nexus);
        self
    }
}

impl Interceptor for OperationalAttributeInterceptor {
    fn name(&self) -> &'static str {
        "operational-attribute"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        let principal = session.principal().clone();

        if let OperationPayload::Add { entry } = &mut ctx.payload {
            for name in OWNED_ATTRIBUTES {
                if entry.has_attribute(name, &self.schema) {
                    return Err(DirectoryError::SchemaViolation(format!(
                        "'{name}' may not be supplied by the client; it is maintained by the server"
                    )));
                }
            }
            let now = AttributeValue::utf8(generalized_time_now());
            entry.add_values("creatorsName", vec![AttributeValue::utf8(principal.to_string())], &self.schema)?;
            entry.add_values("createTimestamp", vec![now.clone()], &self.schema)?;
            entry.add_values("modifiersName", vec![AttributeValue::utf8(principal.to_string())], &self.schema)?;
            entry.add_values("modifyTimestamp", vec![now], &self.schema)?;
            entry.add_values("entryUUID", vec![AttributeValue::utf8(EntryUuid::new_v7().to_string())], &self.schema)?;
            entry.add_values(
                "entryCSN",
                vec![AttributeValue::utf8(self.csn_factory.next().to_string())],
                &self.schema,
            )?;
        }

        let outcome = next.proceed(ctx, session)?;

        if let Some(nexus) = &self.nexus {
            let dn = match &ctx.payload {
                OperationPayload::Modify { dn, .. } => Some(dn.clone()),
                OperationPayload::ModifyDn { new_rdn, delete_old_rdn, new_superior, dn } => {
                    let base = new_superior.clone().or_else(|| dn.parent()).unwrap_or_else(Dn::root);
                    let _ = delete_old_rdn;
                    Some(base.add(new_rdn.clone()))
                }
                _ => None,
            };
            if let Some(dn) = dn {
                let stamps = vec![
                    Modification::replace("modifiersName", vec![AttributeValue::utf8(principal.to_string())]),
                    Modification::replace("modifyTimestamp", vec![AttributeValue::utf8(generalized_time_now())]),
                    Modification::replace(
                        "entryCSN",
                        vec![AttributeValue::utf8(self.csn_factory.next().to_string())],
                    ),
                ];
                if let Some(routed) = nexus.route(&dn) {
                    if let Err(e) = routed.with_store(|s| s.modify_operational(&dn, &stamps, &self.schema)) {
                        tracing::warn!("failed to stamp operational attributes on {dn}: {e}");
                    }
                }
            }
        }

        Ok(outcome)
    }
}

fn generalized_time_now() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{Entry, EntryId, ReplicaId};
    use dirsrv_session::AuthLevel;
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
            Ok(OperationOutcome::Added(EntryId(1)))
        }
    }

    fn chain() -> crate::Chain {
        let schema = Arc::new(bootstrap_registry());
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        crate::ChainBuilder::new()
            .push(OperationalAttributeInterceptor::new(schema, csn_factory))
            .terminal(AlwaysOk)
    }

    #[test]
    fn add_gets_stamped_with_owned_attributes() {
        let chain = chain();
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let entry = Entry::new(dn);
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        session.bind(Dn::from_str("uid=admin,dc=example").unwrap(), AuthLevel::Simple);
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let OperationPayload::Add { entry } = &ctx.payload else {
            panic!("payload changed kind");
        };
        let schema = bootstrap_registry();
        for attr in OWNED_ATTRIBUTES {
            assert!(entry.has_attribute(attr, &schema), "missing {attr}");
        }
    }

    #[test]
    fn add_with_client_supplied_entry_uuid_is_rejected() {
        let chain = chain();
        let schema = bootstrap_registry();
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let mut entry = Entry::new(dn);
        entry
            .add_values("entryUUID", vec![AttributeValue::utf8("not-the-servers-business")], &schema)
            .unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        assert!(matches!(
            chain.dispatch(&mut ctx, &mut session),
            Err(DirectoryError::SchemaViolation(_))
        ));
    }
}
