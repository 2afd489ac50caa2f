//! Attribute syntaxes (RFC 4517 §3): the wire/storage representation an
//! attribute type's values must conform to.

use super::Oid;

/// A syntax definition: OID, description, and whether values are
/// human-readable (governs whether the wire layer may send it as a plain
/// string versus requiring base64/binary transfer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub oid: Oid,
    pub description: String,
    pub human_readable: bool,
}

impl Syntax {
    pub fn new(oid: impl Into<String>, description: impl Into<String>, human_readable: bool) -> Self {
        Self {
            oid: oid.into(),
            description: description.into(),
            human_readable,
        }
    }
}
