//! The operation context: the one object threaded through the whole
//! interceptor chain for a single directory operation.
//!
//! Every operation (bind, add, delete, modify, compare, search, rename,
//! move) is wrapped in an [`OperationContext`] before it enters the
//! chain. Interceptors read the payload to do their work and may attach
//! controls, adjust limits, or add stage names to the bypass set so a
//! later re-dispatch of the same context (a referral retry, a chained
//! operation issued by another interceptor) skips stages that already ran.

use dirsrv_core::{Dn, Entry, Filter, Modification, Rdn};
use std::collections::HashSet;
use std::time::Duration;

/// What the operation actually does, independent of how it got here.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    Bind {
        name: Dn,
        credentials: Vec<u8>,
    },
    Add {
        entry: Entry,
    },
    Delete {
        dn: Dn,
    },
    Modify {
        dn: Dn,
        changes: Vec<Modification>,
    },
    ModifyDn {
        dn: Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    },
    Compare {
        dn: Dn,
        attribute: String,
        value: String,
    },
    Search {
        base: Dn,
        scope: SearchScope,
        filter: Filter,
        attributes: Vec<String>,
        types_only: bool,
    },
    Unbind,
}

/// Search scope (RFC 4511 §4.5.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// Alias dereferencing mode (RFC 4511 §4.5.1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AliasDereferencing {
    #[default]
    Never,
    FindingBaseOnly,
    SearchingOnly,
    Always,
}

impl AliasDereferencing {
    pub fn dereferences_base(self) -> bool {
        matches!(self, Self::FindingBaseOnly | Self::Always)
    }

    pub fn dereferences_search(self) -> bool {
        matches!(self, Self::SearchingOnly | Self::Always)
    }
}

/// What to do when the resolved entry lives on another server
/// (RFC 4511 §4.1.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferralPolicy {
    #[default]
    Return,
    Follow,
}

/// A request control attached to the operation (RFC 4511 §4.1.11):
/// an OID, a criticality flag, and an opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub criticality: bool,
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(oid: impl Into<String>, criticality: bool) -> Self {
        Self {
            oid: oid.into(),
            criticality,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }
}

/// The full per-operation context threaded through the interceptor chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContext {
    pub payload: OperationPayload,
    pub controls: Vec<Control>,
    pub size_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    pub alias_dereferencing: AliasDereferencing,
    pub referral_policy: ReferralPolicy,
    /// `true` for the `manageDsaIT` control: subentries and alias entries
    /// are returned as themselves rather than dereferenced or filtered out
    /// (RFC 4511 §4.5.1.3 "manageDsaIT interaction").
    pub manage_dsa_it: bool,
    /// Stage names already applied to this context; an interceptor with a
    /// matching name short-circuits straight to `next()`. Populated when
    /// re-dispatching a context (e.g. a referral retry) that already made
    /// it partway through the chain.
    bypass: HashSet<&'static str>,
}

impl OperationContext {
    pub fn new(payload: OperationPayload) -> Self {
        Self {
            payload,
            controls: Vec::new(),
            size_limit: None,
            time_limit: None,
            alias_dereferencing: AliasDereferencing::default(),
            referral_policy: ReferralPolicy::default(),
            manage_dsa_it: false,
            bypass: HashSet::new(),
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_alias_dereferencing(mut self, mode: AliasDereferencing) -> Self {
        self.alias_dereferencing = mode;
        self
    }

    pub fn with_referral_policy(mut self, policy: ReferralPolicy) -> Self {
        self.referral_policy = policy;
        self
    }

    pub fn with_manage_dsa_it(mut self, manage: bool) -> Self {
        self.manage_dsa_it = manage;
        self
    }

    pub fn control(&self, oid: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.oid == oid)
    }

    pub fn bypasses(&self, stage: &str) -> bool {
        self.bypass.contains(stage)
    }

    pub fn mark_bypassed(&mut self, stage: &'static str) {
        self.bypass.insert(stage);
    }

    /// The DN this operation targets, if it has a single clear target
    /// (search has a base rather than a target and returns that).
    pub fn target_dn(&self) -> Option<&Dn> {
        match &self.payload {
            OperationPayload::Bind { name, .. } => Some(name),
            OperationPayload::Add { entry } => Some(entry.dn()),
            OperationPayload::Delete { dn } => Some(dn),
            OperationPayload::Modify { dn, .. } => Some(dn),
            OperationPayload::ModifyDn { dn, .. } => Some(dn),
            OperationPayload::Compare { dn, .. } => Some(dn),
            OperationPayload::Search { base, .. } => Some(base),
            OperationPayload::Unbind => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::Dn;
    use std::str::FromStr;

    #[test]
    fn bypass_set_starts_empty() {
        let ctx = OperationContext::new(OperationPayload::Unbind);
        assert!(!ctx.bypasses("schema"));
    }

    #[test]
    fn mark_bypassed_is_observed_by_bypasses() {
        let mut ctx = OperationContext::new(OperationPayload::Unbind);
        ctx.mark_bypassed("schema");
        assert!(ctx.bypasses("schema"));
    }

    #[test]
    fn target_dn_resolves_for_delete() {
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let ctx = OperationContext::new(OperationPayload::Delete { dn: dn.clone() });
        assert_eq!(ctx.target_dn(), Some(&dn));
    }

    #[test]
    fn manage_dsa_it_defaults_to_false() {
        let ctx = OperationContext::new(OperationPayload::Unbind);
        assert!(!ctx.manage_dsa_it);
    }

    #[test]
    fn alias_dereferencing_modes_split_base_and_search() {
        assert!(AliasDereferencing::Always.dereferences_base());
        assert!(AliasDereferencing::Always.dereferences_search());
        assert!(AliasDereferencing::FindingBaseOnly.dereferences_base());
        assert!(!AliasDereferencing::FindingBaseOnly.dereferences_search());
    }
}
