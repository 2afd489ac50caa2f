//! The entry model: a DN plus an attribute-type-keyed set of values,
//! schema-validated against its declared object classes.

use crate::dn::Dn;
use crate::error::{DirectoryError, DirectoryResult};
use crate::schema::{Oid, SchemaRegistry};
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const OBJECT_CLASS_OID: &str = "2.5.4.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AttributeSlot {
    /// The name this attribute was last written under, kept for display;
    /// lookup is always by OID once the entry has seen a schema.
    name: String,
    values: Vec<AttributeValue>,
}

/// A directory entry: one DN and its attributes, keyed internally by OID
/// once normalized so that lookups are name-alias-insensitive.
///
/// Serializable so the partition store can write it straight into the
/// master table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<Oid, AttributeSlot>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Add values to `attr_name`, creating the attribute if absent.
    /// Resolves `attr_name` against `schema`; returns `SchemaViolation` for
    /// an attribute the schema doesn't know.
    pub fn add_values(
        &mut self,
        attr_name: &str,
        mut values: Vec<AttributeValue>,
        schema: &SchemaRegistry,
    ) -> DirectoryResult<()> {
        let at = schema.attribute_type(attr_name).ok_or_else(|| {
            DirectoryError::SchemaViolation(format!("unknown attribute type '{attr_name}'"))
        })?;
        let slot = self
            .attributes
            .entry(at.oid.clone())
            .or_insert_with(|| AttributeSlot {
                name: at.primary_name().to_string(),
                values: Vec::new(),
            });
        if at.single_valued && slot.values.len() + values.len() > 1 {
            return Err(DirectoryError::SchemaViolation(format!(
                "'{attr_name}' is single-valued"
            )));
        }
        slot.values.append(&mut values);
        Ok(())
    }

    pub fn replace_values(
        &mut self,
        attr_name: &str,
        values: Vec<AttributeValue>,
        schema: &SchemaRegistry,
    ) -> DirectoryResult<()> {
        let at = schema.attribute_type(attr_name).ok_or_else(|| {
            DirectoryError::SchemaViolation(format!("unknown attribute type '{attr_name}'"))
        })?;
        if values.is_empty() {
            self.attributes.remove(&at.oid);
            return Ok(());
        }
        if at.single_valued && values.len() > 1 {
            return Err(DirectoryError::SchemaViolation(format!(
                "'{attr_name}' is single-valued"
            )));
        }
        self.attributes.insert(
            at.oid.clone(),
            AttributeSlot {
                name: at.primary_name().to_string(),
                values,
            },
        );
        Ok(())
    }

    /// Remove specific values from `attr_name`; removes the attribute
    /// entirely if that empties it. No-op if `attr_name` is absent.
    pub fn remove_values(
        &mut self,
        attr_name: &str,
        to_remove: &[AttributeValue],
        schema: &SchemaRegistry,
    ) -> DirectoryResult<()> {
        let Some(at) = schema.attribute_type(attr_name) else {
            return Err(DirectoryError::SchemaViolation(format!(
                "unknown attribute type '{attr_name}'"
            )));
        };
        if let Some(slot) = self.attributes.get_mut(&at.oid) {
            slot.values.retain(|v| !to_remove.contains(v));
            if slot.values.is_empty() {
                self.attributes.remove(&at.oid);
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, attr_name: &str, schema: &SchemaRegistry) {
        if let Some(at) = schema.attribute_type(attr_name) {
            self.attributes.remove(&at.oid);
        }
    }

    pub fn values(&self, attr_name: &str, schema: &SchemaRegistry) -> Option<&[AttributeValue]> {
        let at = schema.attribute_type(attr_name)?;
        self.attributes.get(&at.oid).map(|s| s.values.as_slice())
    }

    pub fn has_attribute(&self, attr_name: &str, schema: &SchemaRegistry) -> bool {
        schema
            .attribute_type(attr_name)
            .is_some_and(|at| self.attributes.contains_key(&at.oid))
    }

    pub fn object_classes(&self) -> Vec<&str> {
        self.object_class_names()
    }

    fn object_class_names(&self) -> Vec<&str> {
        self.attributes
            .get(OBJECT_CLASS_OID)
            .into_iter()
            .flat_map(|slot| slot.values.iter())
            .filter_map(|v| match &v.raw {
                crate::value::RawValue::Utf8(s) => Some(s.as_str()),
                crate::value::RawValue::Binary(_) => None,
            })
            .collect()
    }

    pub fn is_structural_member_of(&self, oc_name: &str) -> bool {
        self.object_class_names()
            .iter()
            .any(|n| n.eq_ignore_ascii_case(oc_name))
    }

    /// Split attributes into (user, operational) pairs of `(primary name,
    /// values)`, per the schema's `no_user_modification` flag.
    pub fn split_user_operational(
        &self,
        schema: &SchemaRegistry,
    ) -> (Vec<(&str, &[AttributeValue])>, Vec<(&str, &[AttributeValue])>) {
        let mut user = Vec::new();
        let mut operational = Vec::new();
        for (oid, slot) in &self.attributes {
            let is_op = schema
                .attribute_type(oid)
                .map(|at| at.no_user_modification)
                .unwrap_or(false);
            let entry = (slot.name.as_str(), slot.values.as_slice());
            if is_op {
                operational.push(entry);
            } else {
                user.push(entry);
            }
        }
        (user, operational)
    }

    /// Normalize every value in every attribute against `schema`.
    pub fn normalize(&mut self, schema: &SchemaRegistry) -> DirectoryResult<()> {
        self.dn.normalize(schema)?;
        for (oid, slot) in self.attributes.iter_mut() {
            let at = schema
                .attribute_type(oid)
                .ok_or_else(|| DirectoryError::SchemaViolation(format!("unknown OID '{oid}'")))?;
            for value in slot.values.iter_mut() {
                let normalized = at.normalize_value(value.raw.as_text().as_ref()).map_err(|e| {
                    DirectoryError::SchemaViolation(format!(
                        "value of '{}' does not normalize: {e}",
                        at.primary_name()
                    ))
                })?;
                value.normalized = Some(normalized);
            }
        }
        Ok(())
    }

    /// Validate that this entry has a structural object class and that its
    /// attributes satisfy the effective `MUST`/`MAY` set of its declared
    /// object classes.
    pub fn validate_against_schema(&self, schema: &SchemaRegistry) -> DirectoryResult<()> {
        let classes = self.object_class_names();
        if classes.is_empty() {
            return Err(DirectoryError::SchemaViolation(
                "entry has no objectClass values".to_string(),
            ));
        }
        if !classes.iter().any(|c| schema.has_structural_ancestor(c)) {
            return Err(DirectoryError::SchemaViolation(
                "entry has no structural object class".to_string(),
            ));
        }

        let mut must = Vec::new();
        let mut may = Vec::new();
        for class in &classes {
            let (m, y) = schema
                .effective_must_may(class)
                .map_err(|e| DirectoryError::SchemaViolation(e.to_string()))?;
            must.extend(m);
            may.extend(y);
        }

        for oid in &must {
            if !self.attributes.contains_key(oid) {
                let name = schema
                    .attribute_type(oid)
                    .map(|at| at.primary_name().to_string())
                    .unwrap_or_else(|| oid.clone());
                return Err(DirectoryError::SchemaViolation(format!(
                    "missing required attribute '{name}'"
                )));
            }
        }

        for oid in self.attributes.keys() {
            if oid == OBJECT_CLASS_OID {
                continue;
            }
            if must.contains(oid) || may.contains(oid) {
                continue;
            }
            // Operational attributes (RFC 4512 section 3.4) are governed by
            // directory operation, not by DIT content: every entry carries
            // createTimestamp/entryUUID/entryCSN/etc regardless of what its
            // object classes declare.
            let is_operational = schema
                .attribute_type(oid)
                .map(|at| at.no_user_modification)
                .unwrap_or(false);
            if is_operational {
                continue;
            }
            let name = schema
                .attribute_type(oid)
                .map(|at| at.primary_name().to_string())
                .unwrap_or_else(|| oid.clone());
            return Err(DirectoryError::SchemaViolation(format!(
                "attribute '{name}' not allowed by this entry's object classes"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::bootstrap_registry;
    use std::str::FromStr;

    #[test]
    fn rejects_entry_missing_required_attribute() {
        let schema = bootstrap_registry();
        let mut entry = Entry::new(Dn::from_str("cn=alice,dc=example").unwrap());
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                &schema,
            )
            .unwrap();
        // missing required `sn`
        assert!(entry.validate_against_schema(&schema).is_err());
    }

    #[test]
    fn accepts_well_formed_person_entry() {
        let schema = bootstrap_registry();
        let mut entry = Entry::new(Dn::from_str("cn=alice,dc=example").unwrap());
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                &schema,
            )
            .unwrap();
        entry
            .add_values("cn", vec![AttributeValue::utf8("alice")], &schema)
            .unwrap();
        entry
            .add_values("sn", vec![AttributeValue::utf8("smith")], &schema)
            .unwrap();
        assert!(entry.validate_against_schema(&schema).is_ok());
    }

    #[test]
    fn rejects_disallowed_attribute() {
        let schema = bootstrap_registry();
        let mut entry = Entry::new(Dn::from_str("cn=alice,dc=example").unwrap());
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                &schema,
            )
            .unwrap();
        entry
            .add_values("cn", vec![AttributeValue::utf8("alice")], &schema)
            .unwrap();
        entry
            .add_values("sn", vec![AttributeValue::utf8("smith")], &schema)
            .unwrap();
        entry
            .add_values("dc", vec![AttributeValue::utf8("example")], &schema)
            .unwrap();
        assert!(entry.validate_against_schema(&schema).is_err());
    }
}
