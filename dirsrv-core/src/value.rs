//! Attribute values: the raw (wire) form a client sent, tagged as either
//! human-readable text or opaque binary, alongside the schema-normalized
//! form used for comparison.

use serde::{Deserialize, Serialize};

/// The wire-level representation of one attribute value, before schema
/// normalization. `Binary` values never touch `String` — base64/transfer
/// encoding is the wire layer's concern, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawValue {
    Utf8(String),
    Binary(Vec<u8>),
}

impl RawValue {
    /// A lossy text view, for normalization and display. Binary values are
    /// decoded as UTF-8 lossily; callers that need exact bytes should match
    /// on the variant directly instead.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            RawValue::Utf8(s) => std::borrow::Cow::Borrowed(s),
            RawValue::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn is_human_readable(&self) -> bool {
        matches!(self, RawValue::Utf8(_))
    }
}

/// One attribute value: the form the client supplied, and once normalized,
/// the matching-rule-normalized form used for equality comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub raw: RawValue,
    pub normalized: Option<String>,
}

impl AttributeValue {
    pub fn utf8(value: impl Into<String>) -> Self {
        Self {
            raw: RawValue::Utf8(value.into()),
            normalized: None,
        }
    }

    pub fn binary(bytes: Vec<u8>) -> Self {
        Self {
            raw: RawValue::Binary(bytes),
            normalized: None,
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized.is_some()
    }

    /// Equality by normalized form; both sides must already be normalized.
    pub fn equals_normalized(&self, other: &AttributeValue) -> bool {
        match (&self.normalized, &other.normalized) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_value_is_not_human_readable() {
        let v = AttributeValue::binary(vec![0, 1, 2]);
        assert!(!v.raw.is_human_readable());
    }

    #[test]
    fn unnormalized_values_never_compare_equal() {
        let a = AttributeValue::utf8("Alice");
        let b = AttributeValue::utf8("Alice");
        assert!(!a.equals_normalized(&b));
    }
}
