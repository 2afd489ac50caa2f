//! Errors the façade can raise before an operation ever reaches the
//! interceptor chain: a malformed config file, or a session id nobody
//! ever opened. Everything past that point is a [`dirsrv_core::DirectoryError`].

use thiserror::Error;

/// Errors raised assembling or driving a [`crate::facade::DirectoryServer`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("unknown session")]
    UnknownSession,

    #[error(transparent)]
    Directory(#[from] dirsrv_core::DirectoryError),
}

pub type ServerResult<T> = Result<T, ServerError>;
