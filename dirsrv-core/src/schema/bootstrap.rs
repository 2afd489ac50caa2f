//! The built-in bootstrap schema: the minimal set of syntaxes, matching
//! rules, attribute types and object classes needed to exercise a
//! directory tree (`top`, `person`, `organizationalUnit`, `domain`,
//! `groupOfNames`, the operational attributes) without requiring an
//! external schema file.

use super::matching_rule::MatchingRuleKind;
use super::object_class::ObjectClassKind;
use super::{AttributeType, MatchingRule, ObjectClass, Syntax};
use super::registry::SchemaRegistry;

const SYNTAX_DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
const SYNTAX_DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
const SYNTAX_INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
const SYNTAX_BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
const SYNTAX_OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
const SYNTAX_OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
const SYNTAX_NUMERIC_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.36";
const SYNTAX_GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
const SYNTAX_UUID: &str = "1.3.6.1.1.16.1";
const SYNTAX_IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";

const MR_CASE_IGNORE: &str = "2.5.13.2";
const MR_CASE_EXACT: &str = "2.5.13.5";
const MR_DN: &str = "2.5.13.1";
const MR_INTEGER: &str = "2.5.13.14";
const MR_BOOLEAN: &str = "2.5.13.13";
const MR_NUMERIC: &str = "2.5.13.8";
const MR_OCTET: &str = "2.5.13.17";

fn attr(
    oid: &str,
    names: &[&str],
    syntax_oid: &str,
    equality: (&str, MatchingRuleKind),
    single_valued: bool,
    human_readable: bool,
    no_user_modification: bool,
) -> AttributeType {
    AttributeType {
        oid: oid.to_string(),
        names: names.iter().map(|s| s.to_string()).collect(),
        syntax_oid: syntax_oid.to_string(),
        equality_oid: Some(equality.0.to_string()),
        ordering_oid: None,
        substring_oid: None,
        single_valued,
        no_user_modification,
        human_readable,
        collective: false,
        equality_kind: equality.1,
    }
}

fn oc(
    oid: &str,
    names: &[&str],
    kind: ObjectClassKind,
    superiors: &[&str],
    must: &[&str],
    may: &[&str],
) -> ObjectClass {
    ObjectClass {
        oid: oid.to_string(),
        names: names.iter().map(|s| s.to_string()).collect(),
        kind,
        superiors: superiors.iter().map(|s| s.to_string()).collect(),
        must: must.iter().map(|s| s.to_string()).collect(),
        may: may.iter().map(|s| s.to_string()).collect(),
    }
}

/// Build the bootstrap schema registry. Infallible: every definition below
/// is internally consistent by construction, so a build failure would be a
/// bug in this function, not recoverable caller input — panics rather than
/// returning a `Result` that every startup path would just `.expect()` on.
pub fn bootstrap_registry() -> SchemaRegistry {
    let mut builder = SchemaRegistry::builder()
        .syntax(Syntax::new(SYNTAX_DIRECTORY_STRING, "Directory String", true))
        .syntax(Syntax::new(SYNTAX_DN, "DN", true))
        .syntax(Syntax::new(SYNTAX_INTEGER, "INTEGER", true))
        .syntax(Syntax::new(SYNTAX_BOOLEAN, "BOOLEAN", true))
        .syntax(Syntax::new(SYNTAX_OCTET_STRING, "Octet String", false))
        .syntax(Syntax::new(SYNTAX_OID, "OID", true))
        .syntax(Syntax::new(SYNTAX_NUMERIC_STRING, "Numeric String", true))
        .syntax(Syntax::new(SYNTAX_GENERALIZED_TIME, "Generalized Time", true))
        .syntax(Syntax::new(SYNTAX_UUID, "UUID", true))
        .matching_rule(MatchingRule {
            oid: MR_CASE_IGNORE.to_string(),
            name: "caseIgnoreMatch".to_string(),
            syntax_oid: SYNTAX_DIRECTORY_STRING.to_string(),
            kind: MatchingRuleKind::CaseIgnoreString,
        })
        .matching_rule(MatchingRule {
            oid: MR_CASE_EXACT.to_string(),
            name: "caseExactMatch".to_string(),
            syntax_oid: SYNTAX_DIRECTORY_STRING.to_string(),
            kind: MatchingRuleKind::CaseExactString,
        })
        .matching_rule(MatchingRule {
            oid: MR_DN.to_string(),
            name: "distinguishedNameMatch".to_string(),
            syntax_oid: SYNTAX_DN.to_string(),
            kind: MatchingRuleKind::DistinguishedName,
        })
        .matching_rule(MatchingRule {
            oid: MR_INTEGER.to_string(),
            name: "integerMatch".to_string(),
            syntax_oid: SYNTAX_INTEGER.to_string(),
            kind: MatchingRuleKind::Integer,
        })
        .matching_rule(MatchingRule {
            oid: MR_BOOLEAN.to_string(),
            name: "booleanMatch".to_string(),
            syntax_oid: SYNTAX_BOOLEAN.to_string(),
            kind: MatchingRuleKind::Boolean,
        })
        .matching_rule(MatchingRule {
            oid: MR_NUMERIC.to_string(),
            name: "numericStringMatch".to_string(),
            syntax_oid: SYNTAX_NUMERIC_STRING.to_string(),
            kind: MatchingRuleKind::NumericString,
        })
        .matching_rule(MatchingRule {
            oid: MR_OCTET.to_string(),
            name: "octetStringMatch".to_string(),
            syntax_oid: SYNTAX_OCTET_STRING.to_string(),
            kind: MatchingRuleKind::OctetString,
        });

    let attribute_types = [
        attr(
            "2.5.4.0",
            &["objectClass"],
            SYNTAX_OID,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.3",
            &["cn", "commonName"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.4",
            &["sn", "surname"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "0.9.2342.19200300.100.1.1",
            &["uid", "userid"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "0.9.2342.19200300.100.1.25",
            &["dc", "domainComponent"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.11",
            &["ou", "organizationalUnitName"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.10",
            &["o", "organizationName"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.35",
            &["userPassword"],
            SYNTAX_OCTET_STRING,
            (MR_OCTET, MatchingRuleKind::OctetString),
            true,
            false,
            false,
        ),
        attr(
            "2.5.4.31",
            &["member"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.49",
            &["distinguishedName", "dn"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            true,
            true,
            false,
        ),
        attr(
            "2.5.4.13",
            &["description"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "1.3.6.1.1.16.4",
            &["entryUUID"],
            SYNTAX_UUID,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            true,
            true,
            true,
        ),
        attr(
            "2.5.18.3",
            &["creatorsName"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            true,
            true,
            true,
        ),
        attr(
            "2.5.18.1",
            &["createTimestamp"],
            SYNTAX_GENERALIZED_TIME,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            true,
            true,
            true,
        ),
        attr(
            "2.5.18.4",
            &["modifiersName"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            true,
            true,
            true,
        ),
        attr(
            "2.5.18.2",
            &["modifyTimestamp"],
            SYNTAX_GENERALIZED_TIME,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            true,
            true,
            true,
        ),
        attr(
            "2.5.21.9",
            &["subtreeSpecification"],
            SYNTAX_OCTET_STRING,
            (MR_OCTET, MatchingRuleKind::OctetString),
            true,
            false,
            false,
        ),
        attr(
            "2.5.21.5",
            &["administrativeRole"],
            SYNTAX_OID,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        attr(
            "2.5.4.1",
            &["aliasedObjectName", "aliasedEntryName"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            true,
            true,
            false,
        ),
        attr(
            "1.3.6.1.4.1.1466.101.120.1",
            &["entryCSN"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            true,
            true,
            true,
        ),
        attr(
            "2.5.18.10",
            &["subschemaSubentry"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            true,
            true,
            true,
        ),
        // Subentry back-references (RFC 3672 section 2.4, X.501 section
        // 14.7): point a regular entry at the subentries whose subtree
        // specification selects it, one attribute per administrative
        // area. `collectiveAttributeSubentries` is the one standardized
        // in X.501; access-control and trigger areas aren't part of any
        // published LDAP RFC, so their attributes use this deployment's
        // own arc rather than squatting on an IANA one.
        attr(
            "2.16.840.1.113730.3.1.35",
            &["accessControlSubentries"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            false,
            true,
            true,
        ),
        attr(
            "2.5.18.7",
            &["collectiveAttributeSubentries"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            false,
            true,
            true,
        ),
        attr(
            "2.16.840.1.113730.3.1.36",
            &["triggerExecutionSubentries"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            false,
            true,
            true,
        ),
        // RFC 3671 section 3: per-entry opt-out of specific (or all)
        // collective attributes that would otherwise be merged in from a
        // governing collective-attribute subentry.
        attr(
            "2.5.18.6",
            &["collectiveExclusions"],
            SYNTAX_OID,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            false,
        ),
        // Root DSE attributes (RFC 4512 section 5.1). Only ever present on
        // the synthesized root DSE entry, never on a partition entry.
        attr(
            "1.3.6.1.4.1.1466.101.120.5",
            &["namingContexts"],
            SYNTAX_DN,
            (MR_DN, MatchingRuleKind::DistinguishedName),
            false,
            true,
            true,
        ),
        attr(
            "1.3.6.1.4.1.1466.101.120.15",
            &["supportedLDAPVersion"],
            SYNTAX_INTEGER,
            (MR_INTEGER, MatchingRuleKind::Integer),
            false,
            true,
            true,
        ),
        attr(
            "1.3.6.1.4.1.1466.101.120.13",
            &["supportedControl"],
            SYNTAX_OID,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            true,
        ),
        attr(
            "1.3.6.1.4.1.1466.101.120.7",
            &["supportedExtension"],
            SYNTAX_OID,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            true,
        ),
        attr(
            "1.3.6.1.4.1.1466.101.120.14",
            &["supportedSASLMechanisms"],
            SYNTAX_DIRECTORY_STRING,
            (MR_CASE_IGNORE, MatchingRuleKind::CaseIgnoreString),
            false,
            true,
            true,
        ),
        // RFC 3296: marks an entry as a knowledge reference to another
        // server rather than a real entry in this naming context.
        attr(
            "2.16.840.1.113730.3.1.34",
            &["ref"],
            SYNTAX_IA5_STRING,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            false,
            true,
            false,
        ),
        // Access control item, one rule per value: "scope=<base|subtree>;
        // allow=<comma-separated permissions>;subject=<dn>". Client-settable
        // by design (an administrator writes these), unlike the back-
        // reference and bookkeeping attributes above.
        attr(
            "2.16.840.1.113730.3.1.55",
            &["aci"],
            SYNTAX_IA5_STRING,
            (MR_CASE_EXACT, MatchingRuleKind::CaseExactString),
            false,
            true,
            false,
        ),
    ];

    for at in attribute_types {
        builder = builder.attribute_type(at).expect("bootstrap attribute type is well-formed");
    }

    let object_classes = [
        oc("2.5.6.0", &["top"], ObjectClassKind::Abstract, &[], &["objectClass"], &[]),
        oc(
            "2.5.6.6",
            &["person"],
            ObjectClassKind::Structural,
            &["top"],
            &["sn", "cn"],
            &["userPassword", "description"],
        ),
        oc(
            "2.5.6.7",
            &["organizationalPerson"],
            ObjectClassKind::Structural,
            &["person"],
            &[],
            &["ou"],
        ),
        oc(
            "2.5.6.5",
            &["organizationalUnit"],
            ObjectClassKind::Structural,
            &["top"],
            &["ou"],
            &["description", "administrativeRole", "aci"],
        ),
        oc(
            "2.5.6.4",
            &["organization"],
            ObjectClassKind::Structural,
            &["top"],
            &["o"],
            &["description", "administrativeRole", "aci"],
        ),
        oc(
            "1.3.6.1.4.1.1466.344",
            &["dcObject", "domain"],
            ObjectClassKind::Structural,
            &["top"],
            &["dc"],
            &["description", "administrativeRole", "aci"],
        ),
        oc(
            "2.5.6.9",
            &["groupOfNames"],
            ObjectClassKind::Structural,
            &["top"],
            &["cn", "member"],
            &["description"],
        ),
        oc(
            "2.5.17.0",
            &["subentry"],
            ObjectClassKind::Structural,
            &["top"],
            &["cn", "subtreeSpecification"],
            &["administrativeRole"],
        ),
        oc(
            "2.5.6.1",
            &["alias"],
            ObjectClassKind::Structural,
            &["top"],
            &["aliasedObjectName"],
            &[],
        ),
        oc(
            "2.16.840.1.113730.3.2.6",
            &["referral"],
            ObjectClassKind::Structural,
            &["top"],
            &["ref"],
            &[],
        ),
        oc(
            "1.3.6.1.4.1.1466.101.120.111",
            &["extensibleObject"],
            ObjectClassKind::Auxiliary,
            &["top"],
            &[],
            &["administrativeRole", "aci", "collectiveExclusions"],
        ),
    ];

    for oc in object_classes {
        builder = builder.object_class(oc).expect("bootstrap object class is well-formed");
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_resolves_person_must_may_through_top() {
        let schema = bootstrap_registry();
        let (must, may) = schema.effective_must_may("organizationalPerson").unwrap();
        assert!(must.contains(&"2.5.4.4".to_string()));
        assert!(must.contains(&"2.5.4.0".to_string()));
        assert!(may.contains(&"2.5.4.11".to_string()));
    }

    #[test]
    fn bootstrap_looks_up_attribute_by_alternate_name() {
        let schema = bootstrap_registry();
        assert!(schema.attribute_type("userid").is_some());
        assert!(schema.attribute_type("UID").is_some());
    }
}
