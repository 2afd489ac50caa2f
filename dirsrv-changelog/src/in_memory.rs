//! An in-memory [`ChangeLog`] backed by a `Vec`, for tests and for
//! partitions that don't need change-log persistence across restarts.

use crate::changelog::{ChangeLog, ChangeRecord, ChangeRecordDraft};
use dirsrv_core::{DirectoryResult, Revision};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    records: Vec<ChangeRecord>,
    tags: HashMap<String, Revision>,
}

impl InMemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeLog for InMemoryChangeLog {
    fn append(&mut self, draft: ChangeRecordDraft) -> DirectoryResult<Revision> {
        let revision = self.latest().next();
        self.records.push(ChangeRecord {
            revision,
            csn: draft.csn,
            dn: draft.dn,
            forward: draft.forward,
            reverse: draft.reverse,
            principal: draft.principal,
            tag: None,
        });
        Ok(revision)
    }

    fn record(&self, revision: Revision) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.revision == revision)
    }

    fn since(&self, since: Revision) -> Vec<&ChangeRecord> {
        self.records.iter().filter(|r| r.revision > since).collect()
    }

    fn latest(&self) -> Revision {
        self.records.last().map(|r| r.revision).unwrap_or(Revision::ZERO)
    }

    fn tag(&mut self, tag: &str, revision: Revision) {
        self.tags.insert(tag.to_string(), revision);
        if let Some(record) = self.records.iter_mut().find(|r| r.revision == revision) {
            record.tag = Some(tag.to_string());
        }
    }

    fn revision_for_tag(&self, tag: &str) -> Option<Revision> {
        self.tags.get(tag).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::ChangeOp;
    use crate::ChangeLogExt;
    use dirsrv_core::{Csn, Dn, Entry, ReplicaId};
    use std::str::FromStr;

    fn draft(n: u64) -> ChangeRecordDraft {
        let dn = Dn::from_str(&format!("cn=e{n},dc=example")).unwrap();
        ChangeRecordDraft::new(
            Csn {
                time: chrono::Utc::now(),
                replica_id: ReplicaId(1),
                change_count: n,
            },
            dn.clone(),
            ChangeOp::Add(Entry::new(dn.clone())),
            ChangeOp::Delete(Entry::new(dn)),
        )
    }

    #[test]
    fn append_assigns_increasing_revisions() {
        let mut log = InMemoryChangeLog::new();
        let r1 = log.append(draft(1)).unwrap();
        let r2 = log.append(draft(2)).unwrap();
        assert!(r2 > r1);
    }

    #[test]
    fn since_excludes_the_boundary_revision() {
        let mut log = InMemoryChangeLog::new();
        let r1 = log.append(draft(1)).unwrap();
        log.append(draft(2)).unwrap();
        assert_eq!(log.since(r1).len(), 1);
    }

    #[test]
    fn tag_resolves_back_to_its_revision() {
        let mut log = InMemoryChangeLog::new();
        let r1 = log.append(draft(1)).unwrap();
        log.tag("pre-migration", r1);
        assert_eq!(log.revision_for_tag("pre-migration"), Some(r1));
    }

    #[test]
    fn inverse_replay_plan_is_newest_first() {
        let mut log = InMemoryChangeLog::new();
        let base = log.latest();
        log.append(draft(1)).unwrap();
        log.append(draft(2)).unwrap();
        let plan = log.inverse_replay_plan(base);
        assert_eq!(plan.len(), 2);
    }
}
