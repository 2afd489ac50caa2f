//! Stable identifiers used throughout the directory server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque entry identifier, stable and unique within a single partition.
///
/// Assigned by the partition's master table on `add` and never reused.
/// Two different partitions may assign the same numeric value to
/// unrelated entries; `EntryId` is only meaningful paired with a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing per-partition id allocator for `EntryId`.
///
/// CAS-updated in the store; never decreases, never reuses a value even
/// across a `delete`.
#[derive(Debug, Default)]
pub struct EntryIdAllocator {
    next: std::sync::atomic::AtomicU64,
}

impl EntryIdAllocator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: std::sync::atomic::AtomicU64::new(first),
        }
    }

    pub fn allocate(&self) -> EntryId {
        let value = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        EntryId::new(value)
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// A replica identifier, used as the namespace component of a `Csn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub u32);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Change-sequence number: a monotonically increasing, per-replica
/// timestamp identifying a single mutation. Orderable across replicas by
/// `(time, replica_id, change_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Csn {
    pub time: Timestamp,
    pub replica_id: ReplicaId,
    pub change_count: u64,
}

impl fmt::Display for Csn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{:06}#{}",
            self.time.format("%Y%m%d%H%M%S%.6fZ"),
            self.change_count,
            self.replica_id
        )
    }
}

/// Process-wide monotonically increasing CSN factory for one replica.
///
/// CAS-updated; `next()` never returns a CSN equal to or earlier than any
/// previously issued one, even under concurrent callers.
#[derive(Debug)]
pub struct CsnFactory {
    replica_id: ReplicaId,
    counter: std::sync::atomic::AtomicU64,
}

impl CsnFactory {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> Csn {
        let change_count = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Csn {
            time: Utc::now(),
            replica_id: self.replica_id,
            change_count,
        }
    }
}

/// `entryUUID` operational-attribute value, assigned once on `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryUuid(pub Uuid);

impl EntryUuid {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EntryUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotonically increasing change-log revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
