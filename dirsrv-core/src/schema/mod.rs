//! Schema registries: syntaxes, matching rules, attribute types and object
//! classes, OID-keyed, with name and OID lookup.
//!
//! A single [`SchemaRegistry`] is built once at startup from the built-in
//! bootstrap schema (see [`bootstrap::bootstrap_registry`]) and then passed
//! explicitly to whatever needs it (DN normalization, the schema
//! interceptor, the search cursor builder). There is no process-wide
//! singleton.

mod bootstrap;
mod matching_rule;
mod object_class;
mod registry;
mod syntax;

pub use bootstrap::bootstrap_registry;
pub use matching_rule::{MatchingRule, MatchingRuleKind};
pub use object_class::{ObjectClass, ObjectClassKind};
pub use registry::{SchemaRegistry, SchemaRegistryError};
pub use syntax::Syntax;

/// An OID, represented as its dotted-decimal string. Attribute and object
/// class *names* are aliases resolved to an OID by the registry; the OID
/// itself is the registry's primary key.
pub type Oid = String;

/// An attribute type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    pub oid: Oid,
    pub names: Vec<String>,
    pub syntax_oid: Oid,
    pub equality_oid: Option<Oid>,
    pub ordering_oid: Option<Oid>,
    pub substring_oid: Option<Oid>,
    pub single_valued: bool,
    pub no_user_modification: bool,
    pub human_readable: bool,
    pub collective: bool,
    /// Denormalized from `equality_oid` at bootstrap time so a `Dn`/`Entry`
    /// can normalize a value without holding a `SchemaRegistry` reference.
    pub equality_kind: MatchingRuleKind,
}

impl AttributeType {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) || self.oid == name
    }

    /// Normalize a user-supplied value per this attribute's equality
    /// matching rule.
    pub fn normalize_value(&self, raw: &str) -> Result<String, String> {
        self.equality_kind.normalize(raw)
    }
}
