//! Core data types for the directory server.
//!
//! Pure data and schema-aware operations on it — DN/RDN, entries, values,
//! modifications, filters, schema registries, and the identifiers used to
//! name and order things (`EntryId`, `Csn`, `Revision`). No interceptor
//! logic, no storage engine, no wire protocol: those live in the other
//! crates that depend on this one.

mod administrative_role;
mod config;
mod dn;
mod entry;
mod error;
mod filter;
mod health;
mod identity;
mod modification;
pub mod schema;
mod value;

pub use administrative_role::AdministrativeRoles;
pub use config::{DirectoryConfig, LimitsConfig, PartitionConfig};
pub use dn::{escape_rdn_value, Ava, Dn, NormalizedAva, Rdn};
pub use entry::Entry;
pub use error::{DirectoryError, DirectoryResult, LimitKind};
pub use filter::{ExtensibleFilter, Filter, SubstringFilter};
pub use health::{HealthCheck, HealthStatus};
pub use identity::{Csn, CsnFactory, EntryId, EntryIdAllocator, EntryUuid, ReplicaId, Revision, Timestamp};
pub use modification::{apply_modifications, apply_operational_modifications, Modification, ModificationKind};
pub use schema::{ObjectClassKind, SchemaRegistry};
pub use value::{AttributeValue, RawValue};
