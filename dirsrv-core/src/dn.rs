//! Distinguished Name (DN) and Relative Distinguished Name (RDN) model.
//!
//! This module holds the *data* and the schema-aware operations on it
//! (normalize/equals/isAncestorOf/...). RFC 4514 text parsing lives in
//! `dirsrv-dsl`, which builds `Dn`/`Rdn` values through the constructors
//! below — this crate has no parsing behavior of its own.

use crate::schema::SchemaRegistry;
use crate::DirectoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One attribute-type/value pair inside an RDN, in both the form the
/// client sent (`user_attr`, `user_value`) and, once normalized, the
/// schema-resolved OID and the matching-rule-normalized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ava {
    pub user_attr: String,
    pub user_value: String,
    pub normalized: Option<NormalizedAva>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAva {
    pub attr_oid: String,
    pub value: String,
}

impl Ava {
    pub fn new(user_attr: impl Into<String>, user_value: impl Into<String>) -> Self {
        Self {
            user_attr: user_attr.into(),
            user_value: user_value.into(),
            normalized: None,
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized.is_some()
    }
}

/// A non-empty set of AVAs sharing one RDN position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Build an RDN from a non-empty AVA set. Panics if `avas` is empty —
    /// an RDN with zero AVAs cannot be constructed by any parser and
    /// indicates a caller bug, not a data error.
    pub fn from_avas(avas: Vec<Ava>) -> Self {
        assert!(!avas.is_empty(), "an RDN must contain at least one AVA");
        Self { avas }
    }

    pub fn single(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_avas(vec![Ava::new(attr, value)])
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    pub fn is_multi_valued(&self) -> bool {
        self.avas.len() > 1
    }

    /// Value for `attr_name` (case-insensitive on the user-provided name),
    /// from the user-provided form.
    pub fn value_of(&self, attr_name: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|a| a.user_attr.eq_ignore_ascii_case(attr_name))
            .map(|a| a.user_value.as_str())
    }

    fn normalize(&mut self, schema: &SchemaRegistry) -> Result<(), DirectoryError> {
        for ava in &mut self.avas {
            let at = schema.attribute_type(&ava.user_attr).ok_or_else(|| {
                DirectoryError::SchemaViolation(format!(
                    "unknown attribute type '{}' in RDN",
                    ava.user_attr
                ))
            })?;
            let normalized_value = at.normalize_value(&ava.user_value).map_err(|e| {
                DirectoryError::SchemaViolation(format!(
                    "value of '{}' does not normalize: {e}",
                    ava.user_attr
                ))
            })?;
            ava.normalized = Some(NormalizedAva {
                attr_oid: at.oid.clone(),
                value: normalized_value,
            });
        }
        Ok(())
    }

    fn normalized_sort_key(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .avas
            .iter()
            .map(|a| {
                let n = a
                    .normalized
                    .as_ref()
                    .expect("rdn must be normalized before comparison");
                (n.attr_oid.as_str(), n.value.as_str())
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    fn eq_normalized(&self, other: &Rdn) -> bool {
        self.normalized_sort_key() == other.normalized_sort_key()
    }

    /// RFC 4514 §2.3 textual form, using the user-provided attribute names
    /// and values exactly as supplied (whitespace/case/escaping preserved).
    pub fn to_user_string(&self) -> String {
        self.avas
            .iter()
            .map(|a| format!("{}={}", a.user_attr, escape_rdn_value(&a.user_value)))
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn to_normalized_string(&self) -> String {
        let mut parts: Vec<String> = self
            .avas
            .iter()
            .map(|a| {
                let n = a
                    .normalized
                    .as_ref()
                    .expect("rdn must be normalized before string form");
                format!("{}={}", n.attr_oid, n.value)
            })
            .collect();
        parts.sort_unstable();
        parts.join("+")
    }
}

/// Minimal RFC 4514 value escaping for the characters that always require
/// it (leading/trailing space, leading `#`, and `,+"\<>;`).
fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == ' ' || c == '#'))
            || (i == chars.len() - 1 && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A Distinguished Name: an ordered sequence of RDNs, leaf first.
///
/// The empty DN (zero RDNs) denotes the root DSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    pub fn rdn(&self, i: usize) -> Option<&Rdn> {
        self.rdns.get(i)
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn leaf_rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The DN one level up (everything but the leaf RDN), or `None` if
    /// this is already the root DSE.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Dn {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Returns a new DN with `rdn` prepended as the new leaf.
    pub fn add(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn { rdns }
    }

    /// Returns a new DN with the RDN at index `i` removed.
    pub fn remove(&self, i: usize) -> Option<Dn> {
        if i >= self.rdns.len() {
            return None;
        }
        let mut rdns = self.rdns.clone();
        rdns.remove(i);
        Some(Dn { rdns })
    }

    pub fn is_normalized(&self) -> bool {
        self.rdns.iter().all(|r| r.avas().iter().all(|a| a.is_normalized()))
    }

    /// Normalize every RDN against `schema`; idempotent — normalizing an
    /// already-normalized DN recomputes the same result.
    pub fn normalize(&mut self, schema: &SchemaRegistry) -> Result<(), DirectoryError> {
        for rdn in &mut self.rdns {
            rdn.normalize(schema)?;
        }
        Ok(())
    }

    /// Equality is defined on the normalized form. Both sides
    /// must already be normalized.
    pub fn equals(&self, other: &Dn) -> bool {
        if self.rdns.len() != other.rdns.len() {
            return false;
        }
        self.rdns
            .iter()
            .zip(other.rdns.iter())
            .all(|(a, b)| a.eq_normalized(b))
    }

    /// True iff `self` is an ancestor of (strictly contains as a proper
    /// suffix, or equals) `descendant`; comparison is on normalized
    /// suffixes.
    pub fn is_ancestor_of(&self, descendant: &Dn) -> bool {
        if self.rdns.len() > descendant.rdns.len() {
            return false;
        }
        let offset = descendant.rdns.len() - self.rdns.len();
        self.rdns
            .iter()
            .zip(descendant.rdns[offset..].iter())
            .all(|(a, b)| a.eq_normalized(b))
    }

    /// True iff `self` is a proper descendant of `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        ancestor.is_ancestor_of(self) && self.rdns.len() > ancestor.rdns.len()
    }

    pub fn to_user_string(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::to_user_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_normalized_string(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::to_normalized_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

/// Infallible structural parse used for unit tests and internal
/// construction only: splits on unescaped commas/pluses without handling
/// RFC 4514 quoting or hex escapes. Production text parsing goes through
/// `dirsrv_dsl::parse_dn`.
impl FromStr for Dn {
    type Err = crate::DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Dn::root());
        }
        let mut rdns = Vec::new();
        for rdn_text in split_unescaped(s, ',') {
            let mut avas = Vec::new();
            for ava_text in split_unescaped(&rdn_text, '+') {
                let (attr, value) = ava_text.split_once('=').ok_or_else(|| {
                    DirectoryError::ParseError(format!("malformed AVA '{ava_text}'"))
                })?;
                avas.push(Ava::new(attr.trim(), value.trim()));
            }
            rdns.push(Rdn::from_avas(avas));
        }
        Ok(Dn::from_rdns(rdns))
    }
}

fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::bootstrap_registry as bootstrap_test_registry;

    #[test]
    fn root_dn_is_empty() {
        let dn = Dn::root();
        assert!(dn.is_root());
        assert_eq!(dn.size(), 0);
    }

    #[test]
    fn parent_strips_leaf() {
        let dn = Dn::from_str("cn=alice,ou=users,dc=example").unwrap();
        let parent = dn.parent().unwrap();
        assert_eq!(parent.to_user_string(), "ou=users,dc=example");
    }

    #[test]
    fn add_prepends_leaf() {
        let base = Dn::from_str("ou=users,dc=example").unwrap();
        let full = base.add(Rdn::single("cn", "alice"));
        assert_eq!(full.to_user_string(), "cn=alice,ou=users,dc=example");
    }

    #[test]
    fn normalize_is_idempotent() {
        let schema = bootstrap_test_registry();
        let mut dn = Dn::from_str("CN=Alice,OU=Users,DC=Example").unwrap();
        dn.normalize(&schema).unwrap();
        let once = dn.to_normalized_string();
        dn.normalize(&schema).unwrap();
        let twice = dn.to_normalized_string();
        assert_eq!(once, twice);
    }

    #[test]
    fn equals_is_normalized_form_insensitive() {
        let schema = bootstrap_test_registry();
        let mut a = Dn::from_str("CN=Alice,dc=example").unwrap();
        let mut b = Dn::from_str("cn=alice,dc=example").unwrap();
        a.normalize(&schema).unwrap();
        b.normalize(&schema).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn is_ancestor_of_checks_normalized_suffix() {
        let schema = bootstrap_test_registry();
        let mut parent = Dn::from_str("dc=example").unwrap();
        let mut child = Dn::from_str("cn=alice,dc=example").unwrap();
        parent.normalize(&schema).unwrap();
        child.normalize(&schema).unwrap();
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
    }

    #[test]
    fn unknown_attribute_fails_normalization() {
        let schema = bootstrap_test_registry();
        let mut dn = Dn::from_str("xyzzy=alice,dc=example").unwrap();
        assert!(dn.normalize(&schema).is_err());
    }
}
