//! Error kinds for directory operations.
//!
//! These are the design-level error kinds of the operation pipeline; they
//! are independent of any wire encoding. The collaborator that speaks
//! LDAPv3 on the wire maps each variant onto the result code of the same
//! name in RFC 4511 §4.1.9.

use crate::Dn;
use thiserror::Error;

/// A directory-wide result alias.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Error kinds surfaced by the operation pipeline.
///
/// Propagation policy: parse and schema errors are raised at the
/// earliest stage that detects them and are never swallowed. Access-denied
/// short-circuits the chain without touching the store. A `Referral` short
/// circuits with a dedicated result; it is not a fault.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("no such object: {0}")]
    NotFound(Dn),

    #[error("entry already exists: {0}")]
    AlreadyExists(Dn),

    #[error("operation not allowed on non-leaf entry: {0}")]
    NotLeaf(Dn),

    #[error("operation not allowed on RDN attribute of {0}")]
    NotAllowedOnRdn(Dn),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("referral to {urls:?}")]
    Referral { urls: Vec<String> },

    #[error("alias problem: {0}")]
    AliasProblem(String),

    #[error("loop detected: {0}")]
    LoopDetected(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(LimitKind),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unwilling to perform: {0}")]
    Unwilling(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{stage}: {source}")]
    StageAttributed {
        stage: &'static str,
        #[source]
        source: Box<DirectoryError>,
    },
}

/// Which limit was exceeded, for `DirectoryError::LimitExceeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Size,
    Time,
    Admin,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LimitKind::Size => "size limit",
            LimitKind::Time => "time limit",
            LimitKind::Admin => "admin limit",
        };
        write!(f, "{s}")
    }
}

impl DirectoryError {
    /// Wrap this error with the name of the interceptor stage that
    /// observed it, preserving the underlying recoverable kind so callers
    /// can still match on it via [`DirectoryError::root_kind`].
    pub fn attributed_to(self, stage: &'static str) -> Self {
        DirectoryError::StageAttributed {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost, non-attribution error kind.
    pub fn root_kind(&self) -> &DirectoryError {
        match self {
            DirectoryError::StageAttributed { source, .. } => source.root_kind(),
            other => other,
        }
    }

    /// The LDAP result code name (RFC 4511 §4.1.9) this error maps onto.
    pub fn result_code(&self) -> &'static str {
        match self.root_kind() {
            DirectoryError::ParseError(_) => "invalidDNSyntax",
            DirectoryError::SchemaViolation(_) => "objectClassViolation",
            DirectoryError::NotFound(_) => "noSuchObject",
            DirectoryError::AlreadyExists(_) => "entryAlreadyExists",
            DirectoryError::NotLeaf(_) => "notAllowedOnNonLeaf",
            DirectoryError::NotAllowedOnRdn(_) => "notAllowedOnRDN",
            DirectoryError::AccessDenied(_) => "insufficientAccessRights",
            DirectoryError::AuthRequired => "strongerAuthRequired",
            DirectoryError::InvalidCredentials => "invalidCredentials",
            DirectoryError::Referral { .. } => "referral",
            DirectoryError::AliasProblem(_) => "aliasProblem",
            DirectoryError::LoopDetected(_) => "loopDetect",
            DirectoryError::LimitExceeded(LimitKind::Size) => "sizeLimitExceeded",
            DirectoryError::LimitExceeded(LimitKind::Time) => "timeLimitExceeded",
            DirectoryError::LimitExceeded(LimitKind::Admin) => "adminLimitExceeded",
            DirectoryError::Unavailable(_) => "unavailable",
            DirectoryError::Unwilling(_) => "unwillingToPerform",
            DirectoryError::Internal(_) => "operationsError",
            DirectoryError::StageAttributed { .. } => unreachable!("root_kind unwraps this"),
        }
    }
}
