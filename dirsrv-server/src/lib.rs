//! The operation-manager façade: the crate a transport collaborator (an
//! LDAP wire listener, in a full deployment) embeds to actually run
//! directory operations against a set of mounted partitions.
//!
//! This crate owns configuration loading, session bookkeeping and the
//! default interceptor chain, but none of the network- or codec-facing
//! concerns — those are out of scope by contract, implemented elsewhere.

pub mod credentials;
pub mod error;
pub mod facade;

pub use credentials::StoreCredentialVerifier;
pub use error::{ServerError, ServerResult};
pub use facade::DirectoryServer;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `tracing-subscriber` pipeline: an `EnvFilter` read from
/// `DIRSRV_LOG` (falling back to `info`) feeding a JSON-formatted layer.
/// Call once at process startup, before opening a [`DirectoryServer`].
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("DIRSRV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();
    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}
