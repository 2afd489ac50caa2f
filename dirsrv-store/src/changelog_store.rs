//! A [`ChangeLog`] that survives a restart: every appended record is
//! mirrored into an LMDB database keyed by revision number, and replayed
//! back into an in-memory [`InMemoryChangeLog`] on open so lookups stay
//! simple borrows instead of round-tripping through deserialization on
//! every `record`/`since` call.

use crate::error::{StoreError, StoreResult};
use dirsrv_changelog::{ChangeLog, ChangeRecord, ChangeRecordDraft, InMemoryChangeLog};
use dirsrv_core::{DirectoryResult, Revision};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;

const DEFAULT_MAP_SIZE_MB: usize = 64;

pub struct LmdbChangeLog {
    env: Env,
    records: Database<Bytes, Bytes>,
    tags: Database<Bytes, Bytes>,
    memory: InMemoryChangeLog,
}

impl LmdbChangeLog {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        std::fs::create_dir_all(&path).map_err(StoreError::Io)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE_MB * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| StoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let records: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("records"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        let tags: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some("tags"))
            .map_err(|e| StoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(|e| StoreError::Transaction(e.to_string()))?;

        let mut memory = InMemoryChangeLog::new();
        let rtxn = env
            .read_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        let mut restored: Vec<ChangeRecord> = Vec::new();
        for entry in records
            .iter(&rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?
        {
            let (_, bytes) = entry.map_err(|e| StoreError::Transaction(e.to_string()))?;
            let record: ChangeRecord = serde_json::from_slice(bytes)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            restored.push(record);
        }
        restored.sort_by_key(|r| r.revision);
        for record in restored {
            let draft = ChangeRecordDraft {
                csn: record.csn,
                dn: record.dn,
                forward: record.forward,
                reverse: record.reverse,
                principal: record.principal,
            };
            let revision = memory
                .append(draft)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            if let Some(tag) = record.tag {
                memory.tag(&tag, revision);
            }
        }
        for entry in tags
            .iter(&rtxn)
            .map_err(|e| StoreError::Transaction(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| StoreError::Transaction(e.to_string()))?;
            let tag_name = String::from_utf8_lossy(key).into_owned();
            if let Some(revision) = decode_revision(value) {
                memory.tag(&tag_name, revision);
            }
        }
        drop(rtxn);

        Ok(Self {
            env,
            records,
            tags,
            memory,
        })
    }
}

fn encode_revision(revision: Revision) -> [u8; 8] {
    revision.0.to_be_bytes()
}

fn decode_revision(bytes: &[u8]) -> Option<Revision> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(Revision(u64::from_be_bytes(array)))
}

impl ChangeLog for LmdbChangeLog {
    fn append(&mut self, draft: ChangeRecordDraft) -> DirectoryResult<Revision> {
        let revision = self.memory.append(draft)?;
        let record = self
            .memory
            .record(revision)
            .expect("just-appended revision is present")
            .clone();
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .map_err(dirsrv_core::DirectoryError::from)?;
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::Transaction(e.to_string()))
            .map_err(dirsrv_core::DirectoryError::from)?;
        self.records
            .put(&mut wtxn, &encode_revision(revision), &bytes)
            .map_err(|e| StoreError::Transaction(e.to_string()))
            .map_err(dirsrv_core::DirectoryError::from)?;
        wtxn.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))
            .map_err(dirsrv_core::DirectoryError::from)?;
        Ok(revision)
    }

    fn record(&self, revision: Revision) -> Option<&ChangeRecord> {
        self.memory.record(revision)
    }

    fn since(&self, since: Revision) -> Vec<&ChangeRecord> {
        self.memory.since(since)
    }

    fn latest(&self) -> Revision {
        self.memory.latest()
    }

    fn tag(&mut self, tag: &str, revision: Revision) {
        self.memory.tag(tag, revision);
        let persisted = self.env.write_txn().and_then(|mut wtxn| {
            self.tags.put(&mut wtxn, tag.as_bytes(), &encode_revision(revision))?;
            wtxn.commit()
        });
        if let Err(e) = persisted {
            tracing::warn!("failed to persist change-log tag '{tag}': {e}");
        }
    }

    fn revision_for_tag(&self, tag: &str) -> Option<Revision> {
        self.memory.revision_for_tag(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_changelog::ChangeOp;
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
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log = LmdbChangeLog::open(dir.path()).unwrap();
            log.append(draft(1)).unwrap();
            log.append(draft(2)).unwrap();
            log.tag("checkpoint", Revision(1));
        }
        let reopened = LmdbChangeLog::open(dir.path()).unwrap();
        assert_eq!(reopened.since(Revision::ZERO).len(), 2);
        assert_eq!(reopened.revision_for_tag("checkpoint"), Some(Revision(1)));
    }
}
