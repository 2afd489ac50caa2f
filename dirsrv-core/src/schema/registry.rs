//! The schema registry: OID-keyed storage for syntaxes, matching rules,
//! attribute types and object classes, with case-insensitive name lookup.

use super::{AttributeType, MatchingRule, ObjectClass, ObjectClassKind, Oid, Syntax};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaRegistryError {
    #[error("duplicate OID '{0}' registered")]
    DuplicateOid(Oid),
    #[error("duplicate name '{0}' registered")]
    DuplicateName(String),
    #[error("unknown attribute type '{0}'")]
    UnknownAttributeType(String),
    #[error("unknown object class '{0}'")]
    UnknownObjectClass(String),
    #[error("unknown syntax OID '{0}'")]
    UnknownSyntax(Oid),
}

/// A built schema. Immutable once constructed — extending the schema at
/// runtime means building a new registry, not mutating this one.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    syntaxes: HashMap<Oid, Syntax>,
    matching_rules: HashMap<Oid, MatchingRule>,
    attribute_types: HashMap<Oid, AttributeType>,
    object_classes: HashMap<Oid, ObjectClass>,
    attr_name_to_oid: HashMap<String, Oid>,
    oc_name_to_oid: HashMap<String, Oid>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn syntax(&self, oid: &str) -> Option<&Syntax> {
        self.syntaxes.get(oid)
    }

    pub fn matching_rule(&self, oid: &str) -> Option<&MatchingRule> {
        self.matching_rules.get(oid)
    }

    /// Look up a matching rule by name (case-insensitive) or OID, as named
    /// in an extensible match filter's `matchingRule` component.
    pub fn matching_rule_named(&self, name_or_oid: &str) -> Option<&MatchingRule> {
        if let Some(mr) = self.matching_rules.get(name_or_oid) {
            return Some(mr);
        }
        self.matching_rules.values().find(|mr| mr.name.eq_ignore_ascii_case(name_or_oid))
    }

    /// Look up an attribute type by name (case-insensitive) or OID.
    pub fn attribute_type(&self, name_or_oid: &str) -> Option<&AttributeType> {
        if let Some(at) = self.attribute_types.get(name_or_oid) {
            return Some(at);
        }
        let oid = self.attr_name_to_oid.get(&name_or_oid.to_ascii_lowercase())?;
        self.attribute_types.get(oid)
    }

    /// Look up an object class by name (case-insensitive) or OID.
    pub fn object_class(&self, name_or_oid: &str) -> Option<&ObjectClass> {
        if let Some(oc) = self.object_classes.get(name_or_oid) {
            return Some(oc);
        }
        let oid = self.oc_name_to_oid.get(&name_or_oid.to_ascii_lowercase())?;
        self.object_classes.get(oid)
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = &AttributeType> {
        self.attribute_types.values()
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.object_classes.values()
    }

    /// The full `MUST`/`MAY` attribute OID sets for `object_class`,
    /// including everything inherited through its superior chain
    /// including everything inherited through its superior chain.
    pub fn effective_must_may(
        &self,
        object_class: &str,
    ) -> Result<(Vec<Oid>, Vec<Oid>), SchemaRegistryError> {
        let mut must = Vec::new();
        let mut may = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![object_class.to_string()];
        while let Some(name) = stack.pop() {
            let oc = self
                .object_class(&name)
                .ok_or_else(|| SchemaRegistryError::UnknownObjectClass(name.clone()))?;
            if !seen.insert(oc.oid.clone()) {
                continue;
            }
            for oid in &oc.must {
                if !must.contains(oid) {
                    must.push(oid.clone());
                }
            }
            for oid in &oc.may {
                if !may.contains(oid) {
                    may.push(oid.clone());
                }
            }
            stack.extend(oc.superiors.iter().cloned());
        }
        Ok((must, may))
    }

    /// Whether `oc_name` is, directly or through inheritance, structural.
    pub fn has_structural_ancestor(&self, oc_name: &str) -> bool {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![oc_name.to_string()];
        while let Some(name) = stack.pop() {
            let Some(oc) = self.object_class(&name) else {
                continue;
            };
            if !seen.insert(oc.oid.clone()) {
                continue;
            }
            if oc.kind == ObjectClassKind::Structural {
                return true;
            }
            stack.extend(oc.superiors.iter().cloned());
        }
        false
    }
}

/// Accumulates definitions before freezing them into a `SchemaRegistry`.
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    registry: SchemaRegistry,
}

impl SchemaRegistryBuilder {
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.registry.syntaxes.insert(syntax.oid.clone(), syntax);
        self
    }

    pub fn matching_rule(mut self, rule: MatchingRule) -> Self {
        self.registry.matching_rules.insert(rule.oid.clone(), rule);
        self
    }

    pub fn attribute_type(mut self, at: AttributeType) -> Result<Self, SchemaRegistryError> {
        for name in &at.names {
            let key = name.to_ascii_lowercase();
            if self.registry.attr_name_to_oid.contains_key(&key) {
                return Err(SchemaRegistryError::DuplicateName(name.clone()));
            }
            self.registry.attr_name_to_oid.insert(key, at.oid.clone());
        }
        if self.registry.attribute_types.contains_key(&at.oid) {
            return Err(SchemaRegistryError::DuplicateOid(at.oid));
        }
        self.registry.attribute_types.insert(at.oid.clone(), at);
        Ok(self)
    }

    pub fn object_class(mut self, oc: ObjectClass) -> Result<Self, SchemaRegistryError> {
        for name in &oc.names {
            let key = name.to_ascii_lowercase();
            if self.registry.oc_name_to_oid.contains_key(&key) {
                return Err(SchemaRegistryError::DuplicateName(name.clone()));
            }
            self.registry.oc_name_to_oid.insert(key, oc.oid.clone());
        }
        if self.registry.object_classes.contains_key(&oc.oid) {
            return Err(SchemaRegistryError::DuplicateOid(oc.oid));
        }
        self.registry.object_classes.insert(oc.oid.clone(), oc);
        Ok(self)
    }

    pub fn build(self) -> SchemaRegistry {
        self.registry
    }
}
