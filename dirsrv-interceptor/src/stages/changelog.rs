//! Records every accepted mutation (and its inverse) to a [`ChangeLog`]
//! after the operation has actually succeeded.
//!
//! Runs after [`crate::stages::exception::ExceptionInterceptor`] so a
//! doomed operation never gets a record, and before schema/subentry/
//! collective-attribute bookkeeping so the log reflects what the client
//! asked for rather than what those later stages additionally touched.
//! Reverses are coarse-grained at attribute level for modify (the whole
//! touched attribute is restored to its prior value set, not a
//! value-by-value undo of the add/delete/replace that was requested) —
//! sufficient for [`crate::ChangeLogRevertExt::revert_to`] to revert a
//! partition to an earlier revision by replaying these records' inverses
//! straight against the nexus, with this stage never in the loop.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_changelog::{ChangeLog, ChangeLogExt, ChangeOp, ChangeRecordDraft};
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{CsnFactory, DirectoryError, DirectoryResult, Dn, Entry, Modification, Revision, SchemaRegistry};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::sync::{Arc, Mutex};

pub struct ChangeLogInterceptor {
    csn_factory: Arc<CsnFactory>,
    log: Option<Arc<Mutex<Box<dyn ChangeLog + Send>>>>,
    nexus: Option<Arc<PartitionNexus>>,
    schema: Option<Arc<SchemaRegistry>>,
}

impl ChangeLogInterceptor {
    pub fn new(csn_factory: Arc<CsnFactory>) -> Self {
        Self {
            csn_factory,
            log: None,
            nexus: None,
            schema: None,
        }
    }

    pub fn with_log(
        mut self,
        log: Arc<Mutex<Box<dyn ChangeLog + Send>>>,
        nexus: Arc<PartitionNexus>,
        schema: Arc<SchemaRegistry>,
    ) -> Self {
        self.log = Some(log);
        self.nexus = Some(nexus);
        self.schema = Some(schema);
        self
    }
}

fn reverse_modifications(before: &Entry, changes: &[Modification], schema: &SchemaRegistry) -> Vec<Modification> {
    let mut touched: Vec<&str> = Vec::new();
    for m in changes {
        if !touched.contains(&m.attribute.as_str()) {
            touched.push(&m.attribute);
        }
    }
    touched
        .into_iter()
        .map(|attr| match before.values(attr, schema) {
            Some(values) if !values.is_empty() => Modification::replace(attr.to_string(), values.to_vec()),
            _ => Modification::delete(attr.to_string(), vec![]),
        })
        .collect()
}

impl Interceptor for ChangeLogInterceptor {
    fn name(&self) -> &'static str {
        "changelog"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        let Some(log) = &self.log else {
            return next.proceed(ctx, session);
        };
        let nexus = self.nexus.as_ref().expect("a change log always carries a nexus alongside it");
        let schema = self.schema.as_ref().expect("a change log always carries a schema alongside it");

        let before: Option<Entry> = match &ctx.payload {
            OperationPayload::Delete { dn } | OperationPayload::Modify { dn, .. } | OperationPayload::ModifyDn { dn, .. } => {
                nexus.route(dn).map(|r| r.with_store(|s| s.lookup(dn))).transpose()?.flatten()
            }
            _ => None,
        };
        let principal = session.principal().clone();

        let outcome = next.proceed(ctx, session)?;

        let draft = match &ctx.payload {
            OperationPayload::Add { entry } => Some(ChangeRecordDraft {
                csn: self.csn_factory.next(),
                dn: entry.dn().clone(),
                forward: ChangeOp::Add(entry.clone()),
                reverse: ChangeOp::Delete(entry.clone()),
                principal: Some(principal),
            }),
            OperationPayload::Delete { dn } => before.map(|b| ChangeRecordDraft {
                csn: self.csn_factory.next(),
                dn: dn.clone(),
                forward: ChangeOp::Delete(b.clone()),
                reverse: ChangeOp::Add(b),
                principal: Some(principal),
            }),
            OperationPayload::Modify { dn, changes } => before.map(|b| ChangeRecordDraft {
                csn: self.csn_factory.next(),
                dn: dn.clone(),
                forward: ChangeOp::Modify(changes.clone()),
                reverse: ChangeOp::Modify(reverse_modifications(&b, changes, schema)),
                principal: Some(principal),
            }),
            OperationPayload::ModifyDn {
                dn,
                new_rdn,
                delete_old_rdn,
                new_superior,
            } => dn.leaf_rdn().map(|old_rdn| {
                let old_rdn = old_rdn.clone();
                ChangeRecordDraft {
                    csn: self.csn_factory.next(),
                    dn: dn.clone(),
                    forward: ChangeOp::ModifyDn {
                        old_rdn: old_rdn.clone(),
                        new_rdn: new_rdn.clone(),
                        delete_old_rdn: *delete_old_rdn,
                        new_superior: new_superior.clone(),
                    },
                    reverse: ChangeOp::ModifyDn {
                        old_rdn: new_rdn.clone(),
                        new_rdn: old_rdn,
                        delete_old_rdn: *delete_old_rdn,
                        new_superior: new_superior.as_ref().and(dn.parent()),
                    },
                    principal: Some(principal),
                }
            }),
            _ => None,
        };

        if let Some(draft) = draft {
            let mut guard = log.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = guard.append(draft) {
                tracing::warn!("failed to append change-log record: {e}");
            }
        }

        Ok(outcome)
    }
}

/// Reverts a change log to an earlier revision by replaying its recorded
/// inverses straight against a [`PartitionNexus`] — never through
/// [`ChangeLogInterceptor`] or any other stage, so the replay itself
/// leaves no trace in the log it's undoing.
pub trait ChangeLogRevertExt: ChangeLog {
    /// Undo every record after `target`, most recent first, by applying
    /// each one's reverse [`ChangeOp`] directly to whichever partition is
    /// authoritative for its dn. `admin` is the principal the revert is
    /// attributed to in the trace it leaves behind.
    fn revert_to(
        &self,
        nexus: &PartitionNexus,
        schema: &SchemaRegistry,
        admin: &mut Session,
        target: Revision,
    ) -> DirectoryResult<()> {
        tracing::info!(principal = %admin.principal(), target = target.0, "reverting change log");
        for (dn, op, original_principal) in self.inverse_replay_plan(target) {
            apply_reverse(nexus, schema, &dn, op)?;
            tracing::info!(
                dn = %dn,
                reverting_as = %admin.principal(),
                original_principal = %original_principal.as_ref().map(Dn::to_user_string).unwrap_or_default(),
                "applied reverse change"
            );
        }
        Ok(())
    }
}

impl<T: ChangeLog + ?Sized> ChangeLogRevertExt for T {}

fn apply_reverse(nexus: &PartitionNexus, schema: &SchemaRegistry, dn: &Dn, op: ChangeOp) -> DirectoryResult<()> {
    let routed = nexus.route(dn).ok_or_else(|| DirectoryError::NotFound(dn.clone()))?;
    routed.with_store(|store| match op {
        ChangeOp::Add(entry) => store.add(entry, schema).map(|_| ()),
        ChangeOp::Delete(_) => store.delete(dn, schema),
        ChangeOp::Modify(mods) => store.modify(dn, &mods, schema),
        ChangeOp::ModifyDn { new_rdn, delete_old_rdn, new_superior, .. } => match new_superior {
            Some(superior) => store.move_and_rename(dn, &superior, new_rdn, delete_old_rdn, schema).map(|_| ()),
            None => store.rename(dn, new_rdn, delete_old_rdn, schema).map(|_| ()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_changelog::InMemoryChangeLog;
    use dirsrv_context::OperationPayload;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{AttributeValue, Dn, ModificationKind, ReplicaId};
    use std::str::FromStr;

    struct AlwaysOk;

    impl Interceptor for AlwaysOk {
        fn name(&self) -> &'static str {
            "always-ok"
        }

        fn invoke(
            &self,
            _ctx: &mut OperationContext,
            _session: &mut Session,
            _next: Invocation<'_>,
        ) -> DirectoryResult<OperationOutcome> {
            Ok(OperationOutcome::Modified)
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<PartitionNexus>, Arc<SchemaRegistry>) {
        let schema = Arc::new(bootstrap_registry());
        let dir = tempfile::tempdir().unwrap();
        let suffix = Dn::from_str("dc=example").unwrap();
        let store = dirsrv_store::PartitionStore::open(dir.path(), suffix.clone()).unwrap();
        let nexus = PartitionNexus::new();
        nexus.mount(suffix, store);
        (dir, Arc::new(nexus), schema)
    }

    #[test]
    fn add_is_recorded_with_a_delete_reverse() {
        let (_dir, nexus, schema) = fixture();
        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus, schema))
            .terminal(AlwaysOk);
        let entry = Entry::new(Dn::from_str("dc=example").unwrap());
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let guard = log.lock().unwrap();
        assert_eq!(guard.latest(), dirsrv_core::Revision(1));
        let record = guard.record(dirsrv_core::Revision(1)).unwrap();
        assert!(matches!(record.forward, ChangeOp::Add(_)));
        assert!(matches!(record.reverse, ChangeOp::Delete(_)));
    }

    #[test]
    fn modify_reverse_restores_prior_attribute_wholesale() {
        let (_dir, nexus, schema) = fixture();
        let dn = Dn::from_str("dc=example").unwrap();
        let mut entry = Entry::new(dn.clone());
        entry.add_values("description", vec![AttributeValue::utf8("old")], &schema).unwrap();
        nexus.route(&dn).unwrap().with_store(|s| s.add(entry, &schema)).unwrap();

        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus, schema.clone()))
            .terminal(AlwaysOk);
        let changes = vec![Modification {
            kind: ModificationKind::Replace,
            attribute: "description".to_string(),
            values: vec![AttributeValue::utf8("new")],
        }];
        let mut ctx = OperationContext::new(OperationPayload::Modify { dn, changes });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let guard = log.lock().unwrap();
        let record = guard.record(dirsrv_core::Revision(1)).unwrap();
        match &record.reverse {
            ChangeOp::Modify(mods) => {
                assert_eq!(mods.len(), 1);
                assert_eq!(mods[0].kind, ModificationKind::Replace);
                assert_eq!(mods[0].values[0].raw.as_text(), "old");
            }
            other => panic!("expected a modify reverse, got {other:?}"),
        }
    }

    #[test]
    fn modify_dn_with_a_new_superior_is_recorded_as_a_move() {
        let (_dir, nexus, schema) = fixture();
        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus, schema))
            .terminal(AlwaysOk);

        let dn = Dn::from_str("cn=alice,ou=people,dc=example").unwrap();
        let new_superior = Dn::from_str("ou=groups,dc=example").unwrap();
        let new_rdn = dirsrv_core::Rdn::single("cn", "alicia");
        let mut ctx = OperationContext::new(OperationPayload::ModifyDn {
            dn: dn.clone(),
            new_rdn: new_rdn.clone(),
            delete_old_rdn: true,
            new_superior: Some(new_superior.clone()),
        });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let guard = log.lock().unwrap();
        let record = guard.record(dirsrv_core::Revision(1)).unwrap();
        match &record.forward {
            ChangeOp::ModifyDn { new_superior: fwd, .. } => assert_eq!(fwd.as_ref(), Some(&new_superior)),
            other => panic!("expected a modifyDn forward, got {other:?}"),
        }
        match &record.reverse {
            ChangeOp::ModifyDn { new_superior: rev, .. } => assert_eq!(rev.as_ref(), dn.parent().as_ref()),
            other => panic!("expected a modifyDn reverse, got {other:?}"),
        }
    }

    #[test]
    fn modify_dn_without_a_new_superior_reverses_with_none() {
        let (_dir, nexus, schema) = fixture();
        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus, schema))
            .terminal(AlwaysOk);

        let dn = Dn::from_str("cn=alice,dc=example").unwrap();
        let new_rdn = dirsrv_core::Rdn::single("cn", "alicia");
        let mut ctx = OperationContext::new(OperationPayload::ModifyDn {
            dn: dn.clone(),
            new_rdn,
            delete_old_rdn: true,
            new_superior: None,
        });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        let guard = log.lock().unwrap();
        let record = guard.record(dirsrv_core::Revision(1)).unwrap();
        match &record.reverse {
            ChangeOp::ModifyDn { new_superior: rev, .. } => assert!(rev.is_none()),
            other => panic!("expected a modifyDn reverse, got {other:?}"),
        }
    }

    #[test]
    fn revert_to_restores_a_deleted_entry() {
        let (_dir, nexus, schema) = fixture();
        let dn = Dn::from_str("dc=example").unwrap();
        let mut entry = Entry::new(dn.clone());
        entry.add_values("description", vec![AttributeValue::utf8("original")], &schema).unwrap();
        nexus.route(&dn).unwrap().with_store(|s| s.add(entry, &schema)).unwrap();

        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus.clone(), schema.clone()))
            .terminal(AlwaysOk);
        let mut ctx = OperationContext::new(OperationPayload::Delete { dn: dn.clone() });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();
        assert!(nexus.route(&dn).unwrap().with_store(|s| s.lookup(&dn)).unwrap().is_none());

        {
            let guard = log.lock().unwrap();
            guard.revert_to(&nexus, &schema, &mut session, dirsrv_core::Revision(0)).unwrap();
        }

        let restored = nexus.route(&dn).unwrap().with_store(|s| s.lookup(&dn)).unwrap().unwrap();
        assert_eq!(restored.values("description", &schema).unwrap()[0].raw.as_text(), "original");
    }

    #[test]
    fn revert_to_undoes_a_modify_but_not_the_add_before_it() {
        let (_dir, nexus, schema) = fixture();
        let dn = Dn::from_str("dc=example").unwrap();
        let entry = Entry::new(dn.clone());
        nexus.route(&dn).unwrap().with_store(|s| s.add(entry, &schema)).unwrap();

        let log: Arc<Mutex<Box<dyn ChangeLog + Send>>> = Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let csn_factory = Arc::new(CsnFactory::new(ReplicaId(1)));
        let chain = crate::ChainBuilder::new()
            .push(ChangeLogInterceptor::new(csn_factory).with_log(log.clone(), nexus.clone(), schema.clone()))
            .terminal(AlwaysOk);
        let changes = vec![Modification {
            kind: ModificationKind::Replace,
            attribute: "description".to_string(),
            values: vec![AttributeValue::utf8("new")],
        }];
        let target = log.lock().unwrap().latest();
        let mut ctx = OperationContext::new(OperationPayload::Modify { dn: dn.clone(), changes });
        let mut session = Session::anonymous();
        chain.dispatch(&mut ctx, &mut session).unwrap();

        {
            let guard = log.lock().unwrap();
            guard.revert_to(&nexus, &schema, &mut session, target).unwrap();
        }

        let reverted = nexus.route(&dn).unwrap().with_store(|s| s.lookup(&dn)).unwrap().unwrap();
        assert!(reverted.values("description", &schema).is_none());
    }
}
