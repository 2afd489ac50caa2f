//! The indexed partition store: a master table plus navigation and
//! attribute indices backed by LMDB, the bidirectional cursor protocol
//! composite filters are built from, the filter-to-cursor search
//! evaluator, the partition nexus that routes a DN to its authoritative
//! partition, and a persisted change log.

mod changelog_store;
mod cursor;
mod error;
mod keys;
mod nexus;
mod partition;
mod search;

pub use changelog_store::LmdbChangeLog;
pub use cursor::{and_cursor, or_cursor, not_cursor, Cursor, VecCursor};
pub use error::{StoreError, StoreResult};
pub use nexus::{nexus_from_config, PartitionNexus, RoutedPartition};
pub use partition::PartitionStore;
pub use search::{search, DerefAliases, ReturningAttrs, Scope, SearchRequest};
