//! Sessions and principals: the authenticated identity and per-connection
//! policy a client's operations run under, from `bind` to `unbind`.
//!
//! A session is the one piece of state that outlives a single operation.
//! Every [`dirsrv_context::OperationContext`] is constructed against a
//! particular session by whichever component owns the connection (the
//! operation-manager façade); the context itself stays a plain,
//! non-owning payload carrier rather than embedding a borrowed session,
//! so that constructing one never needs a lifetime parameter threaded
//! through the whole interceptor chain.

use dirsrv_context::ReferralPolicy;
use dirsrv_core::Dn;
use std::time::Duration;
use uuid::Uuid;

/// Opaque per-connection identifier, assigned when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

/// RFC 4513 §5 authentication strength, ordered so `>=` comparisons (used
/// by the authentication interceptor to enforce a minimum bind strength)
/// read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthLevel {
    /// Anonymous bind, or no bind performed yet.
    None,
    /// Simple (plaintext password) bind.
    Simple,
    /// A SASL mechanism offering integrity/confidentiality protection.
    Strong,
}

/// Connection-scoped defaults an operation context inherits unless it
/// overrides them explicitly: referral handling, confidentiality, and
/// resource limits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionPolicies {
    pub referral_policy: ReferralPolicy,
    /// Whether this connection requires a confidentiality-protecting
    /// transport (TLS or a SASL security layer) for further operations;
    /// set once a `StartTLS` or a confidentiality-providing SASL bind
    /// completes.
    pub confidentiality: bool,
    pub default_size_limit: Option<u64>,
    pub default_time_limit: Option<Duration>,
}

/// An authenticated (or anonymous) client connection.
///
/// Created on `bind`, destroyed on `unbind` or transport close. Identity
/// is always present (anonymous until a successful bind sets it);
/// `effective_principal` is distinct from `principal` only while
/// impersonating (a proxy-authorization control in effect).
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: SessionId,
    principal: Dn,
    auth_level: AuthLevel,
    effective_principal: Option<Dn>,
    policies: ConnectionPolicies,
}

impl Session {
    /// A fresh, anonymous session, as created when a connection is first
    /// accepted and before any `bind` has completed.
    pub fn anonymous() -> Self {
        Self {
            id: SessionId::new(),
            principal: Dn::root(),
            auth_level: AuthLevel::None,
            effective_principal: None,
            policies: ConnectionPolicies::default(),
        }
    }

    pub fn with_policies(mut self, policies: ConnectionPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn principal(&self) -> &Dn {
        self.effective_principal.as_ref().unwrap_or(&self.principal)
    }

    /// The DN the connection actually authenticated as, ignoring any
    /// proxy-authorization impersonation in effect.
    pub fn authenticated_principal(&self) -> &Dn {
        &self.principal
    }

    pub fn auth_level(&self) -> AuthLevel {
        self.auth_level
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_level > AuthLevel::None
    }

    pub fn policies(&self) -> &ConnectionPolicies {
        &self.policies
    }

    /// Replace this session's identity after a successful bind. A rebind
    /// on an already-bound connection (RFC 4513 §3.1.3) simply overwrites
    /// the prior principal rather than stacking.
    pub fn bind(&mut self, principal: Dn, auth_level: AuthLevel) {
        tracing::info!(principal = %principal, ?auth_level, "session bound");
        self.principal = principal;
        self.auth_level = auth_level;
        self.effective_principal = None;
    }

    /// Enter the anonymous, unauthenticated state, as `unbind` leaves the
    /// connection in before it closes. Distinct from dropping the
    /// session: a client may issue further operations (which should all
    /// fail as unauthenticated) before the transport actually closes.
    pub fn unbind(&mut self) {
        tracing::info!(principal = %self.principal, "session unbound");
        self.principal = Dn::root();
        self.auth_level = AuthLevel::None;
        self.effective_principal = None;
    }

    /// Assert a different effective principal for the remainder of this
    /// session (a proxy-authorization control). The original
    /// authenticated principal is still recoverable via
    /// `authenticated_principal`.
    pub fn impersonate(&mut self, principal: Dn) {
        self.effective_principal = Some(principal);
    }

    pub fn stop_impersonating(&mut self) {
        self.effective_principal = None;
    }
}

/// Resolves whether a principal belongs to a group, the directory lookup
/// the admin-authority check needs but that this crate has no business
/// performing itself — implemented by whichever component holds a handle
/// to the partition nexus (the authentication interceptor, in practice).
///
/// Kept as a trait rather than a direct dependency on `dirsrv-store` so
/// this crate stays storage-agnostic; admin authority is a question about
/// an identity, not about how entries are indexed.
pub trait GroupMembershipResolver {
    fn is_member(&self, group: &Dn, principal: &Dn) -> bool;
}

/// Decide whether `session` currently holds administrative authority.
///
/// A principal is an administrator if it matches `admin_dn` exactly, or
/// if it is a member of `admin_group` (when one is configured). The
/// group-membership check exists because an identity-equality-only check
/// is insufficient once more than one account should be able to act with
/// admin authority; omitting it was flagged as a defect to fix.
pub fn resolve_admin_authority(
    session: &Session,
    admin_dn: &Dn,
    admin_group: Option<&Dn>,
    groups: &dyn GroupMembershipResolver,
) -> bool {
    let principal = session.principal();
    if principal.equals(admin_dn) {
        return true;
    }
    match admin_group {
        Some(group) => groups.is_member(group, principal),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    struct FixedGroup(Dn, Vec<Dn>);

    impl GroupMembershipResolver for FixedGroup {
        fn is_member(&self, group: &Dn, principal: &Dn) -> bool {
            group.equals(&self.0) && self.1.iter().any(|m| m.equals(principal))
        }
    }

    #[test]
    fn anonymous_session_is_not_authenticated() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        assert_eq!(session.auth_level(), AuthLevel::None);
    }

    #[test]
    fn bind_then_unbind_round_trips_to_anonymous() {
        let mut session = Session::anonymous();
        let dn = Dn::from_str("uid=alice,ou=people,dc=example,dc=com").unwrap();
        session.bind(dn.clone(), AuthLevel::Simple);
        assert!(session.is_authenticated());
        assert!(session.principal().equals(&dn));
        session.unbind();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn impersonation_overrides_principal_but_not_authenticated_principal() {
        let mut session = Session::anonymous();
        let bound = Dn::from_str("uid=proxy,ou=people,dc=example,dc=com").unwrap();
        let target = Dn::from_str("uid=alice,ou=people,dc=example,dc=com").unwrap();
        session.bind(bound.clone(), AuthLevel::Strong);
        session.impersonate(target.clone());
        assert!(session.principal().equals(&target));
        assert!(session.authenticated_principal().equals(&bound));
    }

    #[test]
    fn admin_authority_by_exact_match() {
        let mut session = Session::anonymous();
        let admin = Dn::from_str("uid=admin,ou=system").unwrap();
        session.bind(admin.clone(), AuthLevel::Simple);
        let groups = FixedGroup(Dn::from_str("cn=admins,ou=groups,dc=example,dc=com").unwrap(), vec![]);
        assert!(resolve_admin_authority(&session, &admin, None, &groups));
    }

    #[test]
    fn admin_authority_by_group_membership() {
        let mut session = Session::anonymous();
        let member = Dn::from_str("uid=bob,ou=people,dc=example,dc=com").unwrap();
        session.bind(member.clone(), AuthLevel::Simple);
        let admin_dn = Dn::from_str("uid=admin,ou=system").unwrap();
        let admin_group = Dn::from_str("cn=admins,ou=groups,dc=example,dc=com").unwrap();
        let groups = FixedGroup(admin_group.clone(), vec![member]);
        assert!(resolve_admin_authority(&session, &admin_dn, Some(&admin_group), &groups));
    }

    #[test]
    fn non_member_non_admin_has_no_admin_authority() {
        let mut session = Session::anonymous();
        let other = Dn::from_str("uid=carol,ou=people,dc=example,dc=com").unwrap();
        session.bind(other, AuthLevel::Simple);
        let admin_dn = Dn::from_str("uid=admin,ou=system").unwrap();
        let admin_group = Dn::from_str("cn=admins,ou=groups,dc=example,dc=com").unwrap();
        let groups = FixedGroup(admin_group.clone(), vec![]);
        assert!(!resolve_admin_authority(&session, &admin_dn, Some(&admin_group), &groups));
    }
}
