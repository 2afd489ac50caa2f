//! Directory Server Test Utilities
//!
//! Centralized test infrastructure for the directory server workspace:
//! - Proptest generators for DNs, filters, values and entries
//! - Fixture builders for mounted partitions and common entry shapes
//! - Custom assertions for directory-specific validation

pub use dirsrv_core::{
    AttributeValue, Dn, DirectoryConfig, DirectoryError, DirectoryResult, Entry, Filter,
    LimitsConfig, Modification, ModificationKind, PartitionConfig, Rdn, RawValue, SchemaRegistry,
};
pub use dirsrv_store::{PartitionNexus, PartitionStore};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating directory data types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a short, schema-safe attribute-name-friendly token:
    /// lowercase ASCII letters, 3-10 characters.
    pub fn arb_name_token() -> impl Strategy<Value = String> {
        "[a-z]{3,10}"
    }

    /// Generate a single RDN of the form `cn=<token>`.
    pub fn arb_rdn() -> impl Strategy<Value = Rdn> {
        arb_name_token().prop_map(|v| Rdn::single("cn", v))
    }

    /// Generate a DN between 1 and 4 RDNs deep, rooted under `dc=example`.
    pub fn arb_dn() -> impl Strategy<Value = Dn> {
        prop::collection::vec(arb_rdn(), 1..4).prop_map(|mut rdns| {
            rdns.push(Rdn::single("dc", "example"));
            Dn::from_rdns(rdns)
        })
    }

    /// Generate a UTF-8 attribute value from a short printable string.
    pub fn arb_attribute_value() -> impl Strategy<Value = AttributeValue> {
        "[a-zA-Z0-9 ]{1,20}".prop_map(AttributeValue::utf8)
    }

    /// Generate a binary attribute value (arbitrary bytes, never valid UTF-8
    /// text, so callers can distinguish it from `arb_attribute_value`).
    pub fn arb_binary_attribute_value() -> impl Strategy<Value = AttributeValue> {
        prop::collection::vec(any::<u8>(), 1..16).prop_map(AttributeValue::binary)
    }

    /// Generate a leaf search filter (`Equality`/`Present`/`Substring`)
    /// over one of a small, schema-present set of attribute names.
    pub fn arb_leaf_filter() -> impl Strategy<Value = Filter> {
        let attr = prop_oneof![Just("cn"), Just("sn"), Just("description"), Just("ou")];
        prop_oneof![
            attr.clone().prop_map(|a| Filter::Present { attr: a.to_string() }),
            (attr.clone(), "[a-zA-Z0-9]{1,12}")
                .prop_map(|(a, v)| Filter::Equality { attr: a.to_string(), value: v }),
        ]
    }

    /// Generate a filter tree up to two `And`/`Or`/`Not` levels deep over
    /// [`arb_leaf_filter`] leaves.
    pub fn arb_filter() -> impl Strategy<Value = Filter> {
        let leaf = arb_leaf_filter();
        leaf.prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::And),
                prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::Or),
                inner.prop_map(|f| Filter::Not(Box::new(f))),
            ]
        })
    }

    /// Generate one `add`/`delete`/`replace` [`Modification`] targeting
    /// `description`, a MAY attribute every bootstrap structural class
    /// below `person` tolerates.
    pub fn arb_modification() -> impl Strategy<Value = Modification> {
        let values = prop::collection::vec(arb_attribute_value(), 0..3);
        prop_oneof![
            values.clone().prop_map(|v| Modification::add("description", v)),
            values.clone().prop_map(|v| Modification::delete("description", v)),
            values.prop_map(|v| Modification::replace("description", v)),
        ]
    }

    /// Generate a well-formed `person` entry at a generated DN: `top`,
    /// `person` object classes, a `cn` matching the DN's leaf RDN value,
    /// a generated `sn`, and zero or more `description` values.
    pub fn arb_person_entry() -> impl Strategy<Value = Entry> {
        (arb_dn(), arb_name_token(), prop::collection::vec(arb_attribute_value(), 0..3)).prop_map(
            |(dn, sn, descriptions)| {
                let schema = dirsrv_core::schema::bootstrap_registry();
                let cn = dn
                    .leaf_rdn()
                    .and_then(|r| r.value_of("cn"))
                    .unwrap_or("unnamed")
                    .to_string();
                let mut entry = Entry::new(dn);
                entry
                    .add_values(
                        "objectClass",
                        vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                        &schema,
                    )
                    .expect("objectClass is always addable on a fresh entry");
                entry
                    .add_values("cn", vec![AttributeValue::utf8(cn)], &schema)
                    .expect("cn is always addable on a fresh entry");
                entry
                    .add_values("sn", vec![AttributeValue::utf8(sn)], &schema)
                    .expect("sn is always addable on a fresh entry");
                if !descriptions.is_empty() {
                    entry
                        .add_values("description", descriptions, &schema)
                        .expect("description is MAY on person");
                }
                entry
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;

    /// A directory configuration with one partition rooted at `dc=example`
    /// backed by `dir`, at replica id 1 and default limits.
    pub fn minimal_config(dir: &std::path::Path) -> DirectoryConfig {
        DirectoryConfig {
            partitions: vec![PartitionConfig {
                suffix: "dc=example".to_string(),
                data_dir: dir.to_string_lossy().into_owned(),
                map_size_mb: 64,
                indexed_attributes: Vec::new(),
            }],
            limits: LimitsConfig::default(),
            replica_id: 1,
        }
    }

    /// Bootstrap a schema registry and open a single partition rooted at
    /// `dc=example` in a fresh temp directory, with the base `domain` entry
    /// already added. The `tempfile::TempDir` must be kept alive by the
    /// caller for as long as the returned nexus is used.
    pub fn mounted_nexus() -> (tempfile::TempDir, Arc<SchemaRegistry>, Arc<PartitionNexus>) {
        let schema = Arc::new(dirsrv_core::schema::bootstrap_registry());
        let dir = tempfile::tempdir().expect("tempdir creation never fails in a test sandbox");
        let suffix = Dn::from_str("dc=example").expect("static DN text always parses");
        let store = PartitionStore::open(dir.path(), suffix.clone())
            .expect("opening a fresh partition store never fails");
        let nexus = Arc::new(PartitionNexus::new());
        nexus.mount(suffix.clone(), store);

        let mut base = Entry::new(suffix.clone());
        base.add_values(
            "objectClass",
            vec![AttributeValue::utf8("top"), AttributeValue::utf8("domain")],
            &schema,
        )
        .expect("objectClass is always addable on a fresh entry");
        base.add_values("dc", vec![AttributeValue::utf8("example")], &schema)
            .expect("dc is always addable on a fresh entry");
        nexus
            .route(&suffix)
            .expect("dc=example always routes once mounted")
            .with_store(|s| s.add(base, &schema))
            .expect("adding the base entry into a fresh partition never fails");

        (dir, schema, nexus)
    }

    /// A `person` entry at `cn=<cn>,dc=example` with the given surname and
    /// an optional `userPassword` value.
    pub fn person_entry(schema: &SchemaRegistry, cn: &str, sn: &str, password: Option<&[u8]>) -> Entry {
        let dn = Dn::from_str(&format!("cn={cn},dc=example")).expect("generated DN text always parses");
        let mut entry = Entry::new(dn);
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                schema,
            )
            .expect("objectClass is always addable on a fresh entry");
        entry
            .add_values("cn", vec![AttributeValue::utf8(cn)], schema)
            .expect("cn is always addable on a fresh entry");
        entry
            .add_values("sn", vec![AttributeValue::utf8(sn)], schema)
            .expect("sn is always addable on a fresh entry");
        if let Some(bytes) = password {
            entry
                .add_values("userPassword", vec![AttributeValue::binary(bytes.to_vec())], schema)
                .expect("userPassword is MAY on person");
        }
        entry
    }

    /// An `organizationalUnit` entry at `ou=<ou>,dc=example`.
    pub fn organizational_unit_entry(schema: &SchemaRegistry, ou: &str) -> Entry {
        let dn = Dn::from_str(&format!("ou={ou},dc=example")).expect("generated DN text always parses");
        let mut entry = Entry::new(dn);
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("organizationalUnit")],
                schema,
            )
            .expect("objectClass is always addable on a fresh entry");
        entry
            .add_values("ou", vec![AttributeValue::utf8(ou)], schema)
            .expect("ou is always addable on a fresh entry");
        entry
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for directory-specific validation.

    use super::*;

    /// Assert that a `DirectoryResult` is `Ok`.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DirectoryResult<T>) {
        assert!(result.is_ok(), "expected Ok, got Err: {:?}", result);
    }

    /// Assert that a `DirectoryResult` is `Err`.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &DirectoryResult<T>) {
        assert!(result.is_err(), "expected Err, got Ok: {:?}", result);
    }

    /// Assert that a `DirectoryResult` failed with `NotFound` for the
    /// given DN.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DirectoryResult<T>, dn: &Dn) {
        match result {
            Err(DirectoryError::NotFound(found)) => assert!(found.equals(dn), "wrong DN in NotFound error"),
            other => panic!("expected NotFound({dn:?}), got: {other:?}"),
        }
    }

    /// Assert that a `DirectoryResult` failed with `AlreadyExists` for the
    /// given DN.
    #[track_caller]
    pub fn assert_already_exists<T: std::fmt::Debug>(result: &DirectoryResult<T>, dn: &Dn) {
        match result {
            Err(DirectoryError::AlreadyExists(found)) => {
                assert!(found.equals(dn), "wrong DN in AlreadyExists error")
            }
            other => panic!("expected AlreadyExists({dn:?}), got: {other:?}"),
        }
    }

    /// Assert that a `DirectoryResult` failed with `SchemaViolation`.
    #[track_caller]
    pub fn assert_schema_violation<T: std::fmt::Debug>(result: &DirectoryResult<T>) {
        match result {
            Err(DirectoryError::SchemaViolation(_)) => {}
            other => panic!("expected SchemaViolation, got: {other:?}"),
        }
    }

    /// Assert that a `DirectoryResult` failed with `AccessDenied`.
    #[track_caller]
    pub fn assert_access_denied<T: std::fmt::Debug>(result: &DirectoryResult<T>) {
        match result {
            Err(DirectoryError::AccessDenied(_)) => {}
            other => panic!("expected AccessDenied, got: {other:?}"),
        }
    }

    /// Assert that a `DirectoryResult` failed with `Referral` carrying the
    /// given URLs.
    #[track_caller]
    pub fn assert_referral<T: std::fmt::Debug>(result: &DirectoryResult<T>, expected_urls: &[&str]) {
        match result {
            Err(DirectoryError::Referral { urls }) => {
                assert_eq!(urls, expected_urls, "wrong URLs in Referral error")
            }
            other => panic!("expected Referral({expected_urls:?}), got: {other:?}"),
        }
    }

    /// Assert that `entry` carries `value` (by normalized-equality first,
    /// falling back to raw text comparison on unnormalized entries) among
    /// the values of `attribute`.
    #[track_caller]
    pub fn assert_has_value(entry: &Entry, attribute: &str, value: &str, schema: &SchemaRegistry) {
        let values = entry
            .values(attribute, schema)
            .unwrap_or_else(|| panic!("entry {:?} has no values for '{attribute}'", entry.dn()));
        let found = values.iter().any(|v| v.raw.as_text() == value);
        assert!(found, "entry {:?} has no '{attribute}' value '{value}'", entry.dn());
    }

    /// Assert that `entries` contains exactly one entry whose DN equals
    /// `dn`.
    #[track_caller]
    pub fn assert_contains_dn(entries: &[Entry], dn: &Dn) {
        let count = entries.iter().filter(|e| e.dn().equals(dn)).count();
        assert_eq!(count, 1, "expected exactly one entry with DN {dn:?}, found {count}");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use generators::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    #[test]
    fn mounted_nexus_fixture_has_base_entry() {
        let (_dir, schema, nexus) = fixtures::mounted_nexus();
        let dn = Dn::from_str("dc=example").unwrap();
        let found = nexus.route(&dn).unwrap().with_store(|s| s.lookup(&dn)).unwrap();
        assert!(found.is_some());
        assertions::assert_has_value(&found.unwrap(), "dc", "example", &schema);
    }

    #[test]
    fn person_entry_fixture_carries_password() {
        let (_dir, schema, _nexus) = fixtures::mounted_nexus();
        let entry = fixtures::person_entry(&schema, "alice", "alice", Some(b"hunter2"));
        assertions::assert_has_value(&entry, "cn", "alice", &schema);
        let values = entry.values("userPassword", &schema).unwrap();
        assert!(matches!(&values[0].raw, RawValue::Binary(b) if b == b"hunter2"));
    }

    proptest! {
        #[test]
        fn arb_person_entry_always_carries_cn_and_sn(entry in arb_person_entry()) {
            let schema = dirsrv_core::schema::bootstrap_registry();
            prop_assert!(entry.values("cn", &schema).is_some());
            prop_assert!(entry.values("sn", &schema).is_some());
        }

        #[test]
        fn arb_filter_matches_are_deterministic(filter in arb_filter(), entry in arb_person_entry()) {
            let schema = dirsrv_core::schema::bootstrap_registry();
            let first = filter.matches(&entry, &schema);
            let second = filter.matches(&entry, &schema);
            prop_assert_eq!(first, second);
        }
    }
}
