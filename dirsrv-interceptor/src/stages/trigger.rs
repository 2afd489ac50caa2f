//! Stored-procedure triggers: server-side code bound to an operation kind
//! and a subtree, run after the operation that matched it commits.
//!
//! Like [`crate::stages::event::EventInterceptor`] this is an observer
//! stage; a trigger's own failure is reported (via [`tracing`]) rather
//! than rolled back, unless the trigger itself is registered fail-closed,
//! in which case its error is surfaced to the caller as the operation's
//! own result.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{Dn, DirectoryResult};
use dirsrv_session::Session;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    AfterAdd,
    AfterDelete,
    AfterModify,
    AfterModifyDn,
}

impl TriggerKind {
    fn for_payload(payload: &OperationPayload) -> Option<Self> {
        match payload {
            OperationPayload::Add { .. } => Some(TriggerKind::AfterAdd),
            OperationPayload::Delete { .. } => Some(TriggerKind::AfterDelete),
            OperationPayload::Modify { .. } => Some(TriggerKind::AfterModify),
            OperationPayload::ModifyDn { .. } => Some(TriggerKind::AfterModifyDn),
            OperationPayload::Bind { .. } | OperationPayload::Compare { .. } | OperationPayload::Search { .. } | OperationPayload::Unbind => {
                None
            }
        }
    }
}

/// One bound trigger: fires for `kind` operations whose target falls
/// under `subtree`, running `body` with the target DN and (best-effort,
/// the body decides what it needs) the resulting outcome.
pub struct Trigger {
    pub kind: TriggerKind,
    pub subtree: Dn,
    pub fail_closed: bool,
    body: Box<dyn Fn(&Dn, &OperationOutcome) -> DirectoryResult<()> + Send + Sync>,
}

impl Trigger {
    pub fn new(
        kind: TriggerKind,
        subtree: Dn,
        fail_closed: bool,
        body: impl Fn(&Dn, &OperationOutcome) -> DirectoryResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            subtree,
            fail_closed,
            body: Box::new(body),
        }
    }

    fn applies_to(&self, kind: TriggerKind, target: &Dn) -> bool {
        self.kind == kind && (target.equals(&self.subtree) || target.is_descendant_of(&self.subtree))
    }
}

pub struct TriggerInterceptor {
    triggers: RwLock<Vec<Trigger>>,
}

impl TriggerInterceptor {
    pub fn new() -> Self {
        Self {
            triggers: RwLock::new(Vec::new()),
        }
    }

    pub fn bind(&self, trigger: Trigger) {
        self.triggers.write().unwrap_or_else(|e| e.into_inner()).push(trigger);
    }
}

impl Default for TriggerInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for TriggerInterceptor {
    fn name(&self) -> &'static str {
        "trigger"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        let outcome = next.proceed(ctx, session)?;
        let Some(kind) = TriggerKind::for_payload(&ctx.payload) else {
            return Ok(outcome);
        };
        let Some(target) = ctx.target_dn().cloned() else {
            return Ok(outcome);
        };
        let triggers = self.triggers.read().unwrap_or_else(|e| e.into_inner());
        for trigger in triggers.iter().filter(|t| t.applies_to(kind, &target)) {
            if let Err(e) = (trigger.body)(&target, &outcome) {
                if trigger.fail_closed {
                    return Err(e);
                }
                tracing::warn!("trigger on {} failed: {e}", trigger.subtree);
            }
        }
        Ok(outcome)
    }
}
