//! Change notifications: after a mutation commits, every registered
//! [`EventListener`] is told what happened. This stage is purely an
//! observer — a listener's failure is logged and does not roll back or
//! even fail the operation, since nothing downstream of the nexus depends
//! on notification delivery succeeding.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{Dn, DirectoryResult};
use dirsrv_session::Session;
use std::sync::{Arc, RwLock};

/// What happened, for a listener that doesn't want to match on
/// [`dirsrv_context::OperationPayload`]/[`OperationOutcome`] directly.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    Added(Dn),
    Deleted(Dn),
    Modified(Dn),
    Renamed { old_dn: Dn, new_dn: Dn },
}

/// A subscriber to directory change notifications. Implementations decide
/// for themselves which entries they care about (a persistent-search
/// client filtering by base/scope/filter, an outbound webhook dispatcher,
/// a cache invalidator); this trait only carries delivery.
pub trait EventListener: Send + Sync {
    fn notify(&self, event: &OperationEvent);
}

pub struct EventInterceptor {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventInterceptor {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).push(listener);
    }

    fn fire(&self, event: OperationEvent) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener.notify(&event);
        }
    }
}

impl Default for EventInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

fn event_for(payload: &OperationPayload, outcome: &OperationOutcome) -> Option<OperationEvent> {
    match (payload, outcome) {
        (OperationPayload::Add { entry }, OperationOutcome::Added(_)) => Some(OperationEvent::Added(entry.dn().clone())),
        (OperationPayload::Delete { dn }, OperationOutcome::Deleted) => Some(OperationEvent::Deleted(dn.clone())),
        (OperationPayload::Modify { dn, .. }, OperationOutcome::Modified) => Some(OperationEvent::Modified(dn.clone())),
        (OperationPayload::ModifyDn { dn, .. }, OperationOutcome::Renamed(new_dn)) => Some(OperationEvent::Renamed {
            old_dn: dn.clone(),
            new_dn: new_dn.clone(),
        }),
        _ => None,
    }
}

impl Interceptor for EventInterceptor {
    fn name(&self) -> &'static str {
        "event"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        let outcome = next.proceed(ctx, session)?;
        if let Some(event) = event_for(&ctx.payload, &outcome) {
            self.fire(event);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::{DirectoryError, Entry};
    use std::str::FromStr;
    use std::sync::Mutex;

    struct Terminal;

    impl Interceptor for Terminal {
        fn name(&self) -> &'static str {
            "terminal"
        }

        fn invoke(
            &self,
            ctx: &mut OperationContext,
            _session: &mut Session,
            _next: Invocation<'_>,
        ) -> DirectoryResult<OperationOutcome> {
            match &ctx.payload {
                OperationPayload::Add { entry } => Ok(OperationOutcome::Added(dirsrv_core::EntryId(entry.dn().size() as u64))),
                _ => Err(DirectoryError::Internal("unsupported in this test".to_string())),
            }
        }
    }

    struct Recorder(Mutex<Vec<OperationEvent>>);

    impl EventListener for Recorder {
        fn notify(&self, event: &OperationEvent) {
            self.0.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        }
    }

    #[test]
    fn listener_is_notified_after_add_commits() {
        let interceptor = EventInterceptor::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        interceptor.subscribe(recorder.clone());
        let chain = crate::ChainBuilder::new().push(interceptor).terminal(Terminal);
        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let mut ctx = OperationContext::new(OperationPayload::Add { entry: Entry::new(dn.clone()) });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();
        assert_eq!(recorder.0.lock().unwrap().as_slice(), &[OperationEvent::Added(dn)]);
    }
}
