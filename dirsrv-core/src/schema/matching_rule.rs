//! Matching rules: the normalization and comparison behavior attribute
//! types delegate to for equality, ordering and substring matching.
//!
//! Only the rule *kinds* actually needed by the bootstrap schema are
//! modeled; RFC 4517 defines many more syntaxes than this server needs to
//! recognize to serve the operations this server supports.

use super::Oid;

/// The behavior of a matching rule, independent of its OID/name. Kept as a
/// closed enum (rather than a trait object) because every rule the
/// bootstrap schema registers is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchingRuleKind {
    /// Case-exact string equality; no folding beyond RFC 4518 whitespace
    /// collapse.
    CaseExactString,
    /// Case-insensitive string equality (ASCII case folding + whitespace
    /// collapse). The default for attribute types that don't specify one.
    #[default]
    CaseIgnoreString,
    /// Numeric string: only digits and spaces are significant, spaces
    /// insignificant.
    NumericString,
    /// Distinguished name equality: compared RDN-by-RDN once both sides are
    /// normalized `Dn`s. Values are stored as the DN's normalized string
    /// form here since this module has no dependency on `dn.rs`.
    DistinguishedName,
    /// Boolean `TRUE`/`FALSE`, case-insensitive on the way in, canonical
    /// uppercase on the way out.
    Boolean,
    /// Decimal integer, canonicalized by re-rendering the parsed `i64`.
    Integer,
    /// Opaque octet string; normalization is the identity function.
    OctetString,
}

impl MatchingRuleKind {
    /// Normalize `raw` per this rule. Returns an error string (not
    /// `DirectoryError`, to keep this module free of the error module's
    /// crate-level dependencies) describing why the value doesn't conform.
    pub fn normalize(&self, raw: &str) -> Result<String, String> {
        match self {
            MatchingRuleKind::CaseExactString => Ok(collapse_whitespace(raw)),
            MatchingRuleKind::CaseIgnoreString => {
                Ok(collapse_whitespace(&raw.to_ascii_lowercase()))
            }
            MatchingRuleKind::NumericString => {
                let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("'{raw}' is not a numeric string"));
                }
                Ok(digits)
            }
            MatchingRuleKind::DistinguishedName => Ok(collapse_whitespace(&raw.to_ascii_lowercase())),
            MatchingRuleKind::Boolean => match raw.to_ascii_uppercase().as_str() {
                "TRUE" => Ok("TRUE".to_string()),
                "FALSE" => Ok("FALSE".to_string()),
                other => Err(format!("'{other}' is not a valid boolean")),
            },
            MatchingRuleKind::Integer => {
                let n: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{raw}' is not a valid integer"))?;
                Ok(n.to_string())
            }
            MatchingRuleKind::OctetString => Ok(raw.to_string()),
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// A named, OID-keyed matching rule registered with the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRule {
    pub oid: Oid,
    pub name: String,
    pub syntax_oid: Oid,
    pub kind: MatchingRuleKind,
}
