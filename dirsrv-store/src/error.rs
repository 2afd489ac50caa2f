//! Storage-layer errors, folded into [`dirsrv_core::DirectoryError`] at the
//! boundary so callers above the store only ever see the directory-wide
//! error kinds.

use dirsrv_core::DirectoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("failed to open database: {0}")]
    DbOpen(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An I/O or environment-open failure means the partition itself may be
/// wedged (`Unavailable`, worth retrying elsewhere); everything else here
/// is a bug in this crate (`Internal`).
impl From<StoreError> for DirectoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(_) | StoreError::EnvOpen(_) => {
                DirectoryError::Unavailable(e.to_string())
            }
            other => DirectoryError::Internal(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
