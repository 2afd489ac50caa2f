//! The change log: an append-only record of every accepted mutation,
//! forward and reverse, used to reconstruct history and to revert a
//! partition to an earlier revision by replaying inverses.
//!
//! This crate defines the [`ChangeLog`] trait and ships one backing
//! implementation ([`InMemoryChangeLog`]); the persisted LMDB-backed one
//! lives alongside the rest of the indexed store in `dirsrv-store`, which
//! depends on this crate rather than the other way around.

mod changelog;
mod in_memory;

pub use changelog::{
    no_such_revision, ChangeLog, ChangeLogExt, ChangeOp, ChangeRecord, ChangeRecordDraft,
};
pub use in_memory::InMemoryChangeLog;
