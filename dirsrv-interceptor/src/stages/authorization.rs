//! Access control: a nearest-governs ACI model plus a permissive-unless-
//! restricted fallback.
//!
//! Any entry may carry `aci` values, each an independent rule in the form
//! `scope=<base|subtree>;allow=<comma-separated permissions>;subject=<dn>`.
//! Looking up from an operation's target towards the root, the first
//! entry that carries `aci` values decides the operation: a `subtree`
//! rule governs the entry it sits on and everything below it, a `base`
//! rule only the entry it sits on. If several rules on the governing
//! entry name the requesting principal, any one granting the requested
//! permission is enough. An entry further up the tree is never
//! consulted once a closer one has `aci` values at all, matching how
//! directory ACI evaluation stops at the nearest specific point rather
//! than accumulating every ancestor's rules.
//!
//! When no entry on the path carries `aci` at all, [`DefaultAuthorizationInterceptor`]
//! applies a simple fallback: an anonymous session may read and search but
//! not mutate; an authenticated session is otherwise permitted. This
//! fallback is a deliberate simplification rather than a full default-ACI
//! model.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{AttributeValue, Dn, DirectoryError, DirectoryResult, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Search,
    Compare,
    Add,
    Delete,
    Modify,
    Rename,
}

impl Permission {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "read" => Some(Permission::Read),
            "search" => Some(Permission::Search),
            "compare" => Some(Permission::Compare),
            "add" => Some(Permission::Add),
            "delete" => Some(Permission::Delete),
            "modify" => Some(Permission::Modify),
            "rename" => Some(Permission::Rename),
            _ => None,
        }
    }

    /// The permission a payload kind is checked against. `None` for
    /// operations this stage doesn't gate (bind/unbind authenticate
    /// themselves; search result filtering by attribute visibility is the
    /// collective-attribute stage's concern, not this one's).
    fn for_payload(payload: &OperationPayload) -> Option<Self> {
        match payload {
            OperationPayload::Add { .. } => Some(Permission::Add),
            OperationPayload::Delete { .. } => Some(Permission::Delete),
            OperationPayload::Modify { .. } => Some(Permission::Modify),
            OperationPayload::ModifyDn { .. } => Some(Permission::Rename),
            OperationPayload::Compare { .. } => Some(Permission::Compare),
            OperationPayload::Search { .. } => Some(Permission::Search),
            OperationPayload::Bind { .. } | OperationPayload::Unbind => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AciScope {
    Base,
    Subtree,
}

#[derive(Debug, Clone)]
struct AciRule {
    scope: AciScope,
    subject: Dn,
    allow: Vec<Permission>,
}

impl AciRule {
    fn parse(raw: &str) -> Option<Self> {
        let mut scope = None;
        let mut subject = None;
        let mut allow = Vec::new();
        for clause in raw.split(';') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (key, value) = clause.split_once('=')?;
            match key.trim() {
                "scope" => {
                    scope = match value.trim() {
                        "base" => Some(AciScope::Base),
                        "subtree" => Some(AciScope::Subtree),
                        _ => None,
                    }
                }
                "allow" => allow = value.split(',').filter_map(Permission::parse).collect(),
                "subject" => subject = Dn::from_str(value.trim()).ok(),
                _ => {}
            }
        }
        Some(Self {
            scope: scope?,
            subject: subject?,
            allow,
        })
    }
}

/// An entry on the path to the operation's target that carries `aci`
/// values, with its rules parsed. Whichever one is nearest to the target
/// is the only one consulted.
pub struct AdministrativePoint {
    dn: Dn,
    rules: Vec<AciRule>,
}

impl AdministrativePoint {
    fn parse(dn: Dn, values: &[AttributeValue]) -> Self {
        let rules = values.iter().filter_map(|v| AciRule::parse(&v.raw.as_text())).collect();
        Self { dn, rules }
    }

    /// `Some(true)`/`Some(false)` if a rule in scope names `principal`;
    /// `None` if nothing on this point addresses the request at all (the
    /// caller falls through to the default policy).
    fn decide(&self, principal: &Dn, target: &Dn, permission: Permission) -> Option<bool> {
        let mut decided = None;
        for rule in &self.rules {
            let in_scope = match rule.scope {
                AciScope::Base => target.equals(&self.dn),
                AciScope::Subtree => target.equals(&self.dn) || target.is_descendant_of(&self.dn),
            };
            if !in_scope || !rule.subject.equals(principal) {
                continue;
            }
            if rule.allow.contains(&permission) {
                decided = Some(true);
            } else if decided.is_none() {
                decided = Some(false);
            }
        }
        decided
    }
}

pub struct AciAuthorizationInterceptor {
    schema: Option<Arc<SchemaRegistry>>,
    nexus: Option<Arc<PartitionNexus>>,
}

impl AciAuthorizationInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        Self {
            schema: Some(schema),
            nexus: Some(nexus),
        }
    }

    /// A no-op instance, for tests that don't want ACI evaluation.
    pub fn disabled() -> Self {
        Self {
            schema: None,
            nexus: None,
        }
    }

    fn nearest_administrative_point(&self, target: &Dn) -> DirectoryResult<Option<AdministrativePoint>> {
        let (Some(schema), Some(nexus)) = (&self.schema, &self.nexus) else {
            return Ok(None);
        };
        let mut candidate = target.clone();
        loop {
            if let Some(routed) = nexus.route(&candidate) {
                if let Some(entry) = routed.with_store(|s| s.lookup(&candidate))? {
                    if let Some(values) = entry.values("aci", schema) {
                        if !values.is_empty() {
                            return Ok(Some(AdministrativePoint::parse(candidate, values)));
                        }
                    }
                }
            }
            match candidate.parent() {
                Some(parent) => candidate = parent,
                None => return Ok(None),
            }
        }
    }
}

impl Interceptor for AciAuthorizationInterceptor {
    fn name(&self) -> &'static str {
        "aci-authorization"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        if let Some(permission) = Permission::for_payload(&ctx.payload) {
            if let Some(target) = ctx.target_dn().cloned() {
                if let Some(point) = self.nearest_administrative_point(&target)? {
                    match point.decide(session.principal(), &target, permission) {
                        Some(true) => {
                            ctx.mark_bypassed("default-authorization");
                        }
                        Some(false) => {
                            return Err(DirectoryError::AccessDenied(format!(
                                "aci on {} denies {:?} to {}",
                                point.dn,
                                permission,
                                session.principal()
                            )));
                        }
                        None => {}
                    }
                }
            }
        }
        next.proceed(ctx, session)
    }
}

/// Fallback policy for anything no `aci` rule addressed: anonymous
/// sessions may read and search, nothing else; an authenticated session
/// (any bound principal) is otherwise permitted.
pub struct DefaultAuthorizationInterceptor;

impl DefaultAuthorizationInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultAuthorizationInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for DefaultAuthorizationInterceptor {
    fn name(&self) -> &'static str {
        "default-authorization"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        if let Some(permission) = Permission::for_payload(&ctx.payload) {
            let anonymous = session.principal().is_root();
            let read_only = matches!(permission, Permission::Read | Permission::Search | Permission::Compare);
            if anonymous && !read_only {
                return Err(DirectoryError::AccessDenied(
                    "anonymous sessions may not mutate the directory".to_string(),
                ));
            }
        }
        next.proceed(ctx, session)
    }
}
