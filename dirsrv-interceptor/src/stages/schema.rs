//! Enforces object-class structural requirements (single structural class,
//! must/may), maintains the `subschemaSubentry` pointer on every entry,
//! and refuses runtime mutation of `cn=schema` itself.
//!
//! Most of what this stage checks is also enforced further down by
//! [`dirsrv_core::apply_modifications`]/`Entry::validate_against_schema`
//! when the nexus actually persists the change; this stage exists to
//! catch it earlier, with a clean [`dirsrv_core::DirectoryError::SchemaViolation`]
//! attributed to this stage rather than a deeper one, and to check the
//! one rule storage doesn't: that an entry names exactly one structural
//! object class, not merely at least one.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{Dn, DirectoryError, DirectoryResult, ObjectClassKind, SchemaRegistry};
use dirsrv_session::Session;
use std::str::FromStr;
use std::sync::Arc;

pub struct SchemaInterceptor {
    schema: Arc<SchemaRegistry>,
}

impl SchemaInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self { schema }
    }

    fn schema_subentry_dn(&self) -> Dn {
        Dn::from_str("cn=schema").expect("cn=schema is a well-formed DN")
    }
}

fn structural_class_count(entry: &dirsrv_core::Entry, schema: &SchemaRegistry) -> usize {
    entry
        .object_classes()
        .into_iter()
        .filter(|name| schema.object_class(name).map(|oc| oc.kind == ObjectClassKind::Structural).unwrap_or(false))
        .count()
}

impl Interceptor for SchemaInterceptor {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        match &mut ctx.payload {
            OperationPayload::Add { entry } => {
                let count = structural_class_count(entry, &self.schema);
                if count == 0 {
                    return Err(DirectoryError::SchemaViolation(
                        "entry has no structural object class".to_string(),
                    ));
                }
                if count > 1 {
                    return Err(DirectoryError::SchemaViolation(
                        "entry names more than one structural object class".to_string(),
                    ));
                }
                entry.normalize(&self.schema)?;
                entry.validate_against_schema(&self.schema)?;
                entry.replace_values(
                    "subschemaSubentry",
                    vec![dirsrv_core::AttributeValue::utf8(self.schema_subentry_dn().to_user_string())],
                    &self.schema,
                )?;
            }
            OperationPayload::Modify { dn, .. } => {
                if dn.equals(&self.schema_subentry_dn()) {
                    return Err(DirectoryError::Unwilling(
                        "modifying cn=schema at runtime is not supported".to_string(),
                    ));
                }
            }
            _ => {}
        }
        next.proceed(ctx, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{AttributeValue, Entry};

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

    fn chain() -> crate::Chain {
        let schema = Arc::new(bootstrap_registry());
        crate::ChainBuilder::new().push(SchemaInterceptor::new(schema)).terminal(AlwaysOk)
    }

    #[test]
    fn add_with_two_structural_classes_is_rejected() {
        let chain = chain();
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let schema = bootstrap_registry();
        let mut entry = Entry::new(dn);
        entry
            .add_values(
                "objectClass",
                vec![
                    AttributeValue::utf8("top"),
                    AttributeValue::utf8("person"),
                    AttributeValue::utf8("organizationalUnit"),
                ],
                &schema,
            )
            .unwrap();
        entry.add_values("cn", vec![AttributeValue::utf8("alice")], &schema).unwrap();
        entry.add_values("sn", vec![AttributeValue::utf8("a")], &schema).unwrap();
        entry.add_values("ou", vec![AttributeValue::utf8("alice")], &schema).unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        assert!(matches!(
            chain.dispatch(&mut ctx, &mut session),
            Err(DirectoryError::SchemaViolation(_))
        ));
    }

    #[test]
    fn add_gets_subschema_subentry_pointer() {
        let chain = chain();
        let schema = bootstrap_registry();
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let mut entry = Entry::new(dn);
        entry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")], &schema)
            .unwrap();
        entry.add_values("cn", vec![AttributeValue::utf8("alice")], &schema).unwrap();
        entry.add_values("sn", vec![AttributeValue::utf8("a")], &schema).unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();
        let OperationPayload::Add { entry } = &ctx.payload else {
            panic!("payload changed kind");
        };
        assert!(entry.has_attribute("subschemaSubentry", &schema));
    }

    #[test]
    fn modify_of_schema_subentry_is_refused() {
        let chain = chain();
        let mut ctx = OperationContext::new(OperationPayload::Modify {
            dn: Dn::from_str("cn=schema").unwrap(),
            changes: vec![],
        });
        let mut session = Session::anonymous();
        assert!(matches!(
            chain.dispatch(&mut ctx, &mut session),
            Err(DirectoryError::Unwilling(_))
        ));
    }
}
