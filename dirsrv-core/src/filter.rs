//! The search filter AST (RFC 4511 §4.5.1), independent of its textual
//! (RFC 4515) or BER wire form — both of which are built by other crates
//! on top of these constructors.

use crate::entry::Entry;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attr: String, value: String },
    Substring(SubstringFilter),
    GreaterOrEqual { attr: String, value: String },
    LessOrEqual { attr: String, value: String },
    Present { attr: String },
    ApproxMatch { attr: String, value: String },
    Extensible(ExtensibleFilter),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstringFilter {
    pub attr: String,
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensibleFilter {
    pub matching_rule: Option<String>,
    pub attr: Option<String>,
    pub value: String,
    pub dn_attributes: bool,
}

impl Filter {
    /// Evaluate this filter directly against one entry, without building a
    /// cursor. Used by the compare operation and by subtree specification
    /// filters; the search path compiles filters into index cursors
    /// instead (see the partition store crate) but falls back to this for
    /// any clause an index can't serve.
    pub fn matches(&self, entry: &Entry, schema: &SchemaRegistry) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|f| f.matches(entry, schema)),
            Filter::Or(children) => children.iter().any(|f| f.matches(entry, schema)),
            Filter::Not(inner) => !inner.matches(entry, schema),
            Filter::Present { attr } => entry.has_attribute(attr, schema),
            Filter::Equality { attr, value } => match_equality(entry, schema, attr, value),
            Filter::ApproxMatch { attr, value } => match_equality(entry, schema, attr, value),
            Filter::Substring(s) => match_substring(entry, schema, s),
            Filter::GreaterOrEqual { attr, value } => {
                match_ordering(entry, schema, attr, value, std::cmp::Ordering::is_ge)
            }
            Filter::LessOrEqual { attr, value } => {
                match_ordering(entry, schema, attr, value, std::cmp::Ordering::is_le)
            }
            Filter::Extensible(ext) => match_extensible(entry, schema, ext),
        }
    }
}

fn normalize_or_empty(schema: &SchemaRegistry, attr: &str, value: &str) -> Option<String> {
    schema
        .attribute_type(attr)
        .and_then(|at| at.normalize_value(value).ok())
}

fn match_equality(entry: &Entry, schema: &SchemaRegistry, attr: &str, value: &str) -> bool {
    let Some(target) = normalize_or_empty(schema, attr, value) else {
        return false;
    };
    let Some(values) = entry.values(attr, schema) else {
        return false;
    };
    values.iter().any(|v| v.normalized.as_deref() == Some(target.as_str()))
}

fn match_ordering(
    entry: &Entry,
    schema: &SchemaRegistry,
    attr: &str,
    value: &str,
    accept: fn(std::cmp::Ordering) -> bool,
) -> bool {
    let Some(target) = normalize_or_empty(schema, attr, value) else {
        return false;
    };
    let Some(values) = entry.values(attr, schema) else {
        return false;
    };
    values
        .iter()
        .filter_map(|v| v.normalized.as_deref())
        .any(|v| accept(v.cmp(target.as_str())))
}

fn match_substring(entry: &Entry, schema: &SchemaRegistry, s: &SubstringFilter) -> bool {
    let Some(values) = entry.values(&s.attr, schema) else {
        return false;
    };
    let normalize = |raw: &str| normalize_or_empty(schema, &s.attr, raw);
    let initial = s.initial.as_deref().and_then(normalize);
    let final_ = s.final_.as_deref().and_then(normalize);
    let anys: Vec<String> = s.any.iter().filter_map(|a| normalize(a)).collect();

    values.iter().filter_map(|v| v.normalized.as_deref()).any(|v| {
        let mut rest = v;
        if let Some(ref init) = initial {
            if !rest.starts_with(init.as_str()) {
                return false;
            }
            rest = &rest[init.len()..];
        }
        for any in &anys {
            match rest.find(any.as_str()) {
                Some(idx) => rest = &rest[idx + any.len()..],
                None => return false,
            }
        }
        if let Some(ref fin) = final_ {
            if !rest.ends_with(fin.as_str()) {
                return false;
            }
        }
        true
    })
}

fn match_extensible(entry: &Entry, schema: &SchemaRegistry, ext: &ExtensibleFilter) -> bool {
    let Some(attr) = &ext.attr else {
        return false;
    };
    if ext.dn_attributes {
        let rdn_match = entry.dn().leaf_rdn().is_some_and(|rdn| {
            rdn.avas().iter().any(|ava| {
                ava.user_attr.eq_ignore_ascii_case(attr) && ava.user_value == ext.value
            })
        });
        if rdn_match {
            return true;
        }
    }
    let Some(rule_name) = &ext.matching_rule else {
        return match_equality(entry, schema, attr, &ext.value);
    };
    let Some(rule) = schema.matching_rule_named(rule_name) else {
        return false;
    };
    let Ok(target) = rule.kind.normalize(&ext.value) else {
        return false;
    };
    let Some(values) = entry.values(attr, schema) else {
        return false;
    };
    values.iter().any(|v| {
        rule.kind
            .normalize(&v.raw.as_text())
            .is_ok_and(|normalized| normalized == target)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;
    use crate::schema::bootstrap_registry;
    use crate::value::AttributeValue;
    use std::str::FromStr;

    fn alice(schema: &SchemaRegistry) -> Entry {
        let mut entry = Entry::new(Dn::from_str("cn=alice,dc=example").unwrap());
        entry
            .add_values(
                "objectClass",
                vec![AttributeValue::utf8("top"), AttributeValue::utf8("person")],
                schema,
            )
            .unwrap();
        entry
            .add_values("cn", vec![AttributeValue::utf8("Alice")], schema)
            .unwrap();
        entry
            .add_values("sn", vec![AttributeValue::utf8("Smith")], schema)
            .unwrap();
        entry.normalize(schema).unwrap();
        entry
    }

    #[test]
    fn equality_is_case_insensitive_via_normalization() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::Equality {
            attr: "cn".to_string(),
            value: "ALICE".to_string(),
        };
        assert!(f.matches(&entry, &schema));
    }

    #[test]
    fn and_requires_every_clause() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::And(vec![
            Filter::Equality {
                attr: "cn".to_string(),
                value: "alice".to_string(),
            },
            Filter::Equality {
                attr: "sn".to_string(),
                value: "jones".to_string(),
            },
        ]);
        assert!(!f.matches(&entry, &schema));
    }

    #[test]
    fn substring_matches_initial_and_final() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::Substring(SubstringFilter {
            attr: "cn".to_string(),
            initial: Some("al".to_string()),
            any: vec![],
            final_: Some("ce".to_string()),
        });
        assert!(f.matches(&entry, &schema));
    }

    #[test]
    fn presence_checks_attribute_existence() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        assert!(Filter::Present { attr: "cn".to_string() }.matches(&entry, &schema));
        assert!(!Filter::Present { attr: "description".to_string() }.matches(&entry, &schema));
    }

    #[test]
    fn extensible_match_dispatches_through_the_named_matching_rule() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::Extensible(ExtensibleFilter {
            matching_rule: Some("caseExactMatch".to_string()),
            attr: Some("cn".to_string()),
            value: "Alice".to_string(),
            dn_attributes: false,
        });
        assert!(f.matches(&entry, &schema));
        let f = Filter::Extensible(ExtensibleFilter {
            matching_rule: Some("caseExactMatch".to_string()),
            attr: Some("cn".to_string()),
            value: "alice".to_string(),
            dn_attributes: false,
        });
        assert!(!f.matches(&entry, &schema));
    }

    #[test]
    fn extensible_match_without_a_rule_falls_back_to_attribute_equality() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::Extensible(ExtensibleFilter {
            matching_rule: None,
            attr: Some("cn".to_string()),
            value: "ALICE".to_string(),
            dn_attributes: false,
        });
        assert!(f.matches(&entry, &schema));
    }

    #[test]
    fn extensible_match_rejects_an_unknown_matching_rule() {
        let schema = bootstrap_registry();
        let entry = alice(&schema);
        let f = Filter::Extensible(ExtensibleFilter {
            matching_rule: Some("noSuchMatch".to_string()),
            attr: Some("cn".to_string()),
            value: "alice".to_string(),
            dn_attributes: false,
        });
        assert!(!f.matches(&entry, &schema));
    }
}
