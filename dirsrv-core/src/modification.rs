//! Modify-operation change descriptors: an ordered list of add/delete/
//! replace actions applied atomically to one entry.

use crate::entry::Entry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::schema::SchemaRegistry;
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModificationKind {
    Add,
    Delete,
    Replace,
}

/// One change in a modify request: per RFC 4511 §4.6, `Delete` with an
/// empty `values` removes the whole attribute rather than specific values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub kind: ModificationKind,
    pub attribute: String,
    pub values: Vec<AttributeValue>,
}

impl Modification {
    pub fn add(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            kind: ModificationKind::Add,
            attribute: attribute.into(),
            values,
        }
    }

    pub fn delete(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            kind: ModificationKind::Delete,
            attribute: attribute.into(),
            values,
        }
    }

    pub fn replace(attribute: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            kind: ModificationKind::Replace,
            attribute: attribute.into(),
            values,
        }
    }
}

/// Apply `mods` to `entry` in order. Each modification is schema-validated
/// as it's applied; the caller is responsible for rolling back if this
/// returns an error partway through, since this function mutates `entry`
/// in place.
pub fn apply_modifications(
    entry: &mut Entry,
    mods: &[Modification],
    schema: &SchemaRegistry,
) -> DirectoryResult<()> {
    apply_modifications_impl(entry, mods, schema, true)
}

/// As [`apply_modifications`], but does not reject NO-USER-MODIFICATION
/// attributes. Reserved for the server's own maintenance of operational
/// attributes (`modifyTimestamp`, `modifiersName`, `entryCSN`); never wire
/// a client-supplied modification list through this path.
pub fn apply_operational_modifications(
    entry: &mut Entry,
    mods: &[Modification],
    schema: &SchemaRegistry,
) -> DirectoryResult<()> {
    apply_modifications_impl(entry, mods, schema, false)
}

fn apply_modifications_impl(
    entry: &mut Entry,
    mods: &[Modification],
    schema: &SchemaRegistry,
    enforce_no_user_modification: bool,
) -> DirectoryResult<()> {
    for m in mods {
        let at = schema.attribute_type(&m.attribute).ok_or_else(|| {
            DirectoryError::SchemaViolation(format!("unknown attribute type '{}'", m.attribute))
        })?;
        if enforce_no_user_modification && at.no_user_modification {
            return Err(DirectoryError::SchemaViolation(format!(
                "'{}' is NO-USER-MODIFICATION",
                m.attribute
            )));
        }
        match m.kind {
            ModificationKind::Add => entry.add_values(&m.attribute, m.values.clone(), schema)?,
            ModificationKind::Replace => {
                entry.replace_values(&m.attribute, m.values.clone(), schema)?
            }
            ModificationKind::Delete => {
                if m.values.is_empty() {
                    entry.remove_attribute(&m.attribute, schema);
                } else {
                    entry.remove_values(&m.attribute, &m.values, schema)?;
                }
            }
        }
    }
    entry.normalize(schema)?;
    entry.validate_against_schema(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;
    use crate::schema::bootstrap_registry;
    use std::str::FromStr;

    fn base_entry(schema: &SchemaRegistry) -> Entry {
        let mut entry = Entry::new(Dn::from_str("cn=alice,dc=example").unwrap());
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                schema,
            )
            .unwrap();
        entry
            .add_values("cn", vec![AttributeValue::utf8("alice")], schema)
            .unwrap();
        entry
            .add_values("sn", vec![AttributeValue::utf8("smith")], schema)
            .unwrap();
        entry
    }

    #[test]
    fn replace_with_empty_values_removes_attribute() {
        let schema = bootstrap_registry();
        let mut entry = base_entry(&schema);
        entry
            .add_values(
                "description",
                vec![AttributeValue::utf8("temp")],
                &schema,
            )
            .unwrap();
        let mods = vec![Modification::replace("description", vec![])];
        apply_modifications(&mut entry, &mods, &schema).unwrap();
        assert!(!entry.has_attribute("description", &schema));
    }

    #[test]
    fn rejects_modification_of_no_user_modification_attribute() {
        let schema = bootstrap_registry();
        let mut entry = base_entry(&schema);
        let mods = vec![Modification::add(
            "createTimestamp",
            vec![AttributeValue::utf8("20260101000000Z")],
        )];
        assert!(apply_modifications(&mut entry, &mods, &schema).is_err());
    }

    #[test]
    fn delete_without_values_removes_whole_attribute() {
        let schema = bootstrap_registry();
        let mut entry = base_entry(&schema);
        let mods = vec![Modification::delete("sn", vec![])];
        let result = apply_modifications(&mut entry, &mods, &schema);
        // removing `sn` violates the MUST constraint for `person`
        assert!(result.is_err());
    }
}
