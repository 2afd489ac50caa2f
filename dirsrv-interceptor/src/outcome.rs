//! What a chain dispatch produces, one variant per operation kind.

use dirsrv_core::{Dn, Entry, EntryId};

/// The successful result of running an [`dirsrv_context::OperationContext`]
/// through the chain. Failure is a `DirectoryResult::Err` instead; there is
/// no "it didn't work" variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Bound,
    Added(EntryId),
    Deleted,
    Modified,
    Renamed(Dn),
    Compared(bool),
    SearchResults(Vec<Entry>),
    Unbound,
}

impl OperationOutcome {
    /// The search results, if this is a search outcome. Convenience for
    /// callers (the operation manager façade) that only ever dispatch
    /// searches through a particular code path and don't want to match on
    /// every variant.
    pub fn into_search_results(self) -> Option<Vec<Entry>> {
        match self {
            OperationOutcome::SearchResults(entries) => Some(entries),
            _ => None,
        }
    }
}
