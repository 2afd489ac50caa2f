//! Second stage of the chain: handles `Bind`/`Unbind` directly (both
//! short-circuit here, since nothing later in the chain has anything to
//! do for either) and otherwise passes operations through unchanged.
//!
//! Credential verification itself is behind [`CredentialVerifier`] rather
//! than a direct `dirsrv-store` dependency, the same seam
//! `dirsrv_session::GroupMembershipResolver` uses for admin-authority
//! checks: this crate shouldn't need to know how a partition stores
//! `userPassword`, only that something can answer "do these credentials
//! authenticate this principal".

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::OperationContext;
use dirsrv_core::{Dn, DirectoryError, DirectoryResult, SchemaRegistry};
use dirsrv_session::{AuthLevel, Session};
use std::sync::Arc;

/// Answers whether a principal's supplied credentials are valid.
/// Implemented by whichever component holds a handle to the partition
/// nexus (the operation-manager façade, in practice), since that's what
/// actually has `userPassword` to compare against.
pub trait CredentialVerifier: Send + Sync {
    /// `true` if `credentials` (a simple-bind password, RFC 4513 §5.1.3)
    /// authenticates `principal`.
    fn verify_simple(&self, principal: &Dn, credentials: &[u8]) -> bool;
}

/// A verifier that rejects every non-anonymous bind; useful as a
/// placeholder before real credential storage is wired up, and in tests
/// that only exercise anonymous access.
pub struct NoCredentials;

impl CredentialVerifier for NoCredentials {
    fn verify_simple(&self, _principal: &Dn, _credentials: &[u8]) -> bool {
        false
    }
}

pub struct AuthenticationInterceptor {
    #[allow(dead_code)]
    schema: Arc<SchemaRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl AuthenticationInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            verifier: Arc::new(NoCredentials),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

impl Interceptor for AuthenticationInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        match &ctx.payload {
            dirsrv_context::OperationPayload::Bind { name, credentials } => {
                // RFC 4513 §5.1.1/§5.1.2: empty name and empty credentials
                // is an anonymous bind; empty credentials with a non-empty
                // name is an unauthenticated bind, which this server
                // refuses rather than silently granting anonymous access
                // under a stated identity.
                if name.is_root() && credentials.is_empty() {
                    session.bind(Dn::root(), AuthLevel::None);
                    return Ok(OperationOutcome::Bound);
                }
                if credentials.is_empty() {
                    return Err(DirectoryError::Unwilling(
                        "unauthenticated bind (empty credentials with a non-empty name) is refused"
                            .to_string(),
                    ));
                }
                if !self.verifier.verify_simple(name, credentials) {
                    return Err(DirectoryError::InvalidCredentials);
                }
                session.bind(name.clone(), AuthLevel::Simple);
                Ok(OperationOutcome::Bound)
            }
            dirsrv_context::OperationPayload::Unbind => {
                session.unbind();
                Ok(OperationOutcome::Unbound)
            }
            _ => next.proceed(ctx, session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_context::OperationPayload;
    use dirsrv_core::schema::bootstrap_registry;
    use std::str::FromStr;

    struct FixedPassword(Dn, Vec<u8>);

    impl CredentialVerifier for FixedPassword {
        fn verify_simple(&self, principal: &Dn, credentials: &[u8]) -> bool {
            principal.equals(&self.0) && credentials == self.1.as_slice()
        }
    }

    fn chain_with(verifier: impl CredentialVerifier + 'static) -> crate::Chain {
        let schema = Arc::new(bootstrap_registry());
        crate::ChainBuilder::new()
            .push(AuthenticationInterceptor::new(schema).with_verifier(Arc::new(verifier)))
            .terminal(crate::stages::exception::ExceptionInterceptor::new())
    }

    #[test]
    fn anonymous_bind_succeeds_and_leaves_session_unauthenticated() {
        let chain = chain_with(NoCredentials);
        let mut ctx = OperationContext::new(OperationPayload::Bind {
            name: Dn::root(),
            credentials: vec![],
        });
        let mut session = Session::anonymous();
        let outcome = chain.dispatch(&mut ctx, &mut session).unwrap();
        assert_eq!(outcome, OperationOutcome::Bound);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn unauthenticated_bind_is_refused() {
        let chain = chain_with(NoCredentials);
        let dn = Dn::from_str("uid=alice,dc=example").unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Bind {
            name: dn,
            credentials: vec![],
        });
        let mut session = Session::anonymous();
        assert!(chain.dispatch(&mut ctx, &mut session).is_err());
    }

    #[test]
    fn simple_bind_with_correct_password_authenticates() {
        let dn = Dn::from_str("uid=alice,dc=example").unwrap();
        let chain = chain_with(FixedPassword(dn.clone(), b"hunter2".to_vec()));
        let mut ctx = OperationContext::new(OperationPayload::Bind {
            name: dn.clone(),
            credentials: b"hunter2".to_vec(),
        });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();
        assert!(session.is_authenticated());
        assert!(session.principal().equals(&dn));
    }

    #[test]
    fn simple_bind_with_wrong_password_is_rejected() {
        let dn = Dn::from_str("uid=alice,dc=example").unwrap();
        let chain = chain_with(FixedPassword(dn.clone(), b"hunter2".to_vec()));
        let mut ctx = OperationContext::new(OperationPayload::Bind {
            name: dn,
            credentials: b"wrong".to_vec(),
        });
        let mut session = Session::anonymous();
        assert!(chain.dispatch(&mut ctx, &mut session).is_err());
    }

    #[test]
    fn unbind_resets_session_to_anonymous() {
        let dn = Dn::from_str("uid=alice,dc=example").unwrap();
        let chain = chain_with(FixedPassword(dn.clone(), b"hunter2".to_vec()));
        let mut session = Session::anonymous();
        session.bind(dn, AuthLevel::Simple);
        let mut ctx = OperationContext::new(OperationPayload::Unbind);
        let outcome = chain.dispatch(&mut ctx, &mut session).unwrap();
        assert_eq!(outcome, OperationOutcome::Unbound);
        assert!(!session.is_authenticated());
    }
}
