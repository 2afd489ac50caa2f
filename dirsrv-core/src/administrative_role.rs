//! The administrative-area bitmask declared by an `administrativeRole`
//! attribute value (X.501 §8.3): access control, subschema, collective
//! attribute and trigger execution. Represented as a bitset rather than a
//! list since a subentry or administrative point never declares more than
//! these four, fixed roles.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AdministrativeRoles: u8 {
        const ACCESS_CONTROL = 0b0001;
        const SUBSCHEMA = 0b0010;
        const COLLECTIVE_ATTRIBUTE = 0b0100;
        const TRIGGER = 0b1000;
    }
}

impl AdministrativeRoles {
    /// Parse one `administrativeRole` attribute value into the single bit
    /// it names, or `None` if it names no known administrative area.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accessControlSpecificArea" => Some(Self::ACCESS_CONTROL),
            "subschemaAdminSpecificArea" => Some(Self::SUBSCHEMA),
            "collectiveAttributeSpecificArea" => Some(Self::COLLECTIVE_ATTRIBUTE),
            "triggerExecutionSpecificArea" => Some(Self::TRIGGER),
            _ => None,
        }
    }

    /// The `administrativeRole` attribute value text for a single-bit
    /// flag. Panics if called on an empty or multi-bit mask.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ACCESS_CONTROL => "accessControlSpecificArea",
            Self::SUBSCHEMA => "subschemaAdminSpecificArea",
            Self::COLLECTIVE_ATTRIBUTE => "collectiveAttributeSpecificArea",
            Self::TRIGGER => "triggerExecutionSpecificArea",
            _ => panic!("as_str called on an empty or multi-bit administrative role mask"),
        }
    }

    /// The operational attribute a subentry governing this single role is
    /// referenced through on a selected entry. Panics on an empty or
    /// multi-bit mask.
    pub fn reference_attribute(self) -> &'static str {
        match self {
            Self::ACCESS_CONTROL => "accessControlSubentries",
            Self::SUBSCHEMA => "subschemaSubentry",
            Self::COLLECTIVE_ATTRIBUTE => "collectiveAttributeSubentries",
            Self::TRIGGER => "triggerExecutionSubentries",
            _ => panic!("reference_attribute called on an empty or multi-bit administrative role mask"),
        }
    }

    /// Iterate the individual single-bit roles set in this mask.
    pub fn iter_roles(self) -> impl Iterator<Item = Self> {
        [Self::ACCESS_CONTROL, Self::SUBSCHEMA, Self::COLLECTIVE_ATTRIBUTE, Self::TRIGGER]
            .into_iter()
            .filter(move |&role| self.contains(role))
    }
}
