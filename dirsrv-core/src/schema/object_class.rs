//! Object classes: structural/abstract/auxiliary kind, `MUST`/`MAY`
//! attribute sets, and superior-class inheritance.

use super::Oid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

/// An object class definition. `must`/`may` list only the attribute types
/// declared directly on this class; the registry walks `superiors` to
/// compute the full effective set (see `SchemaRegistry::effective_must_may`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectClass {
    pub oid: Oid,
    pub names: Vec<String>,
    pub kind: ObjectClassKind,
    pub superiors: Vec<Oid>,
    pub must: Vec<Oid>,
    pub may: Vec<Oid>,
}

impl ObjectClass {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) || self.oid == name
    }
}
