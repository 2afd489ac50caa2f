//! Change-log trait for recording and reverting directory mutations.
//!
//! Every accepted add/delete/modify/rename/move is recorded as a
//! [`ChangeRecord`] carrying both the forward change that was applied and
//! the reverse change that would undo it. Reverting a revision never
//! deletes history — it replays the inverse of every record back to (but
//! not including) the target revision, in reverse order. [`ChangeLogExt::inverse_replay_plan`]
//! is the part of that built on the required trait methods alone; actually
//! driving the replay against a mounted partition needs a nexus and a
//! session, which this crate has no business depending on, so that part
//! lives next to `dirsrv_interceptor::ChangeLogInterceptor` instead, as
//! `dirsrv_interceptor::ChangeLogRevertExt::revert_to`.

use dirsrv_core::{Csn, Dn, DirectoryError, DirectoryResult, Entry, Modification, Revision};
use serde::{Deserialize, Serialize};

/// One side of a change: what was applied to the entry named by
/// `ChangeRecord::dn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeOp {
    Add(Entry),
    Delete(Entry),
    Modify(Vec<Modification>),
    /// A rename, or a rename-and-move when `new_superior` is set. Applying
    /// this when `new_superior` is `None` keeps the entry under its
    /// current superior.
    ModifyDn {
        old_rdn: dirsrv_core::Rdn,
        new_rdn: dirsrv_core::Rdn,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    },
}

/// One entry in the change log: a single mutation, its inverse, and the
/// bookkeeping needed to order and identify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub revision: Revision,
    pub csn: Csn,
    pub dn: Dn,
    pub forward: ChangeOp,
    pub reverse: ChangeOp,
    pub principal: Option<Dn>,
    pub tag: Option<String>,
}

/// Persistent storage and traversal of the change log.
///
/// Implementations provide append-only storage; [`ChangeLogExt::inverse_replay_plan`]
/// is built on top of `record`/`since` using only the trait's required
/// methods.
pub trait ChangeLog {
    /// Append a new record, assigning it the next revision. The caller
    /// supplies everything but the revision number.
    fn append(&mut self, record: ChangeRecordDraft) -> DirectoryResult<Revision>;

    /// Fetch one record by revision.
    fn record(&self, revision: Revision) -> Option<&ChangeRecord>;

    /// All records with revision strictly greater than `since`, oldest
    /// first.
    fn since(&self, since: Revision) -> Vec<&ChangeRecord>;

    /// The highest revision recorded so far.
    fn latest(&self) -> Revision;

    /// Attach a human-readable tag to `revision`; overwrites any existing
    /// revision that tag pointed to.
    fn tag(&mut self, tag: &str, revision: Revision);

    /// Resolve a tag back to the revision it names.
    fn revision_for_tag(&self, tag: &str) -> Option<Revision>;
}

/// Everything [`ChangeLog::append`] needs except the assigned revision.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecordDraft {
    pub csn: Csn,
    pub dn: Dn,
    pub forward: ChangeOp,
    pub reverse: ChangeOp,
    pub principal: Option<Dn>,
}

impl ChangeRecordDraft {
    pub fn new(csn: Csn, dn: Dn, forward: ChangeOp, reverse: ChangeOp) -> Self {
        Self {
            csn,
            dn,
            forward,
            reverse,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Dn) -> Self {
        self.principal = Some(principal);
        self
    }
}

/// Where `record.forward` left the entry `record.dn` named before it was
/// applied. For everything but a rename/move this is just `record.dn`
/// unchanged; a [`ChangeOp::ModifyDn`] moves or renames the entry, so the
/// reverse has to be applied at the new location, not the old one.
fn dn_after_forward(record: &ChangeRecord) -> Dn {
    match &record.forward {
        ChangeOp::ModifyDn { new_rdn, new_superior, .. } => {
            let superior = new_superior.clone().or_else(|| record.dn.parent()).unwrap_or_else(Dn::root);
            superior.add(new_rdn.clone())
        }
        _ => record.dn.clone(),
    }
}

/// Convenience methods built on the required [`ChangeLog`] trait methods.
pub trait ChangeLogExt: ChangeLog {
    /// The inverse changes needed to undo everything after `target`, in
    /// the order they must be replayed (most recent first), each paired
    /// with the dn it applies to and the principal that made the original
    /// (forward) change, for audit logging by the caller — replay always
    /// runs as the reverting admin, never as that original principal.
    fn inverse_replay_plan(&self, target: Revision) -> Vec<(Dn, ChangeOp, Option<Dn>)> {
        self.since(target)
            .into_iter()
            .rev()
            .map(|record| (dn_after_forward(record), record.reverse.clone(), record.principal.clone()))
            .collect()
    }

    /// Whether any record exists for `revision`.
    fn has_revision(&self, revision: Revision) -> bool {
        self.record(revision).is_some()
    }
}

impl<T: ChangeLog + ?Sized> ChangeLogExt for T {}

/// Error returned when a revert target doesn't exist in the log.
pub fn no_such_revision(revision: Revision) -> DirectoryError {
    DirectoryError::Internal(format!("no such revision: {revision}")).attributed_to("changelog")
}
