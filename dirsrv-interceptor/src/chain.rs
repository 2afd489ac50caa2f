//! The chain-of-responsibility machinery the individual stages plug into.
//!
//! Each [`Interceptor`] is handed the remaining chain as an [`Invocation`]
//! it can either hand off to (`next.proceed(...)`) or ignore entirely to
//! short-circuit. A stage that errors has its error tagged with its own
//! name via [`dirsrv_core::DirectoryError::attributed_to`], so a caller
//! debugging a rejected operation can see which stage rejected it without
//! every stage having to remember to do that itself.

use crate::outcome::OperationOutcome;
use dirsrv_context::OperationContext;
use dirsrv_core::{DirectoryError, DirectoryResult};
use dirsrv_session::Session;

/// One stage of the interceptor chain.
///
/// `name` is both the tracing span name and the token a context's bypass
/// set matches against (see [`dirsrv_context::OperationContext::bypasses`]);
/// it should be stable across releases since bypass tokens can be
/// persisted alongside a deferred or replayed operation.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome>;
}

/// The remaining, not-yet-run suffix of a chain.
pub struct Invocation<'a> {
    remaining: &'a [Box<dyn Interceptor>],
}

impl<'a> Invocation<'a> {
    /// Run the next non-bypassed stage (or, if this is the last remaining
    /// stage, the terminal one), attributing any error it returns to that
    /// stage's name.
    pub fn proceed(
        mut self,
        ctx: &mut OperationContext,
        session: &mut Session,
    ) -> DirectoryResult<OperationOutcome> {
        loop {
            let Some((stage, rest)) = self.remaining.split_first() else {
                return Err(DirectoryError::Internal(
                    "interceptor chain exhausted without a terminal stage".to_string(),
                ));
            };
            self.remaining = rest;
            if ctx.bypasses(stage.name()) {
                continue;
            }
            let next = Invocation {
                remaining: self.remaining,
            };
            return stage
                .invoke(ctx, session, next)
                .map_err(|e| e.attributed_to(stage.name()));
        }
    }
}

/// A fully assembled chain, ready to dispatch operations.
pub struct Chain {
    stages: Vec<Box<dyn Interceptor>>,
}

impl Chain {
    pub fn dispatch(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
    ) -> DirectoryResult<OperationOutcome> {
        let invocation = Invocation {
            remaining: &self.stages,
        };
        invocation.proceed(ctx, session)
    }

    /// The stage names in dispatch order, for diagnostics and tests.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Assembles a [`Chain`] one stage at a time. The last stage pushed via
/// [`ChainBuilder::terminal`] is the one actually allowed to ignore
/// `next` — every earlier one is expected to call it.
pub struct ChainBuilder {
    stages: Vec<Box<dyn Interceptor>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn push(mut self, stage: impl Interceptor + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn terminal(mut self, stage: impl Interceptor + 'static) -> Chain {
        self.stages.push(Box::new(stage));
        Chain {
            stages: self.stages,
        }
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
