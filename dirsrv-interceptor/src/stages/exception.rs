//! Fails fast on conditions the nexus and partition store can't detect on
//! their own: a target that doesn't route to any mounted partition at
//! all, and (so the expensive stages after this one never run on an
//! operation that cannot succeed) a target that routes to a partition but
//! doesn't exist in it.
//!
//! Named for the role it plays rather than what it contains: this is
//! where "does the thing I'm about to touch actually exist" gets asked
//! and turned into a clean [`dirsrv_core::DirectoryError::NotFound`]
//! before change logging, schema checking or subentry bookkeeping spend
//! any work on it.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{Dn, DirectoryError, DirectoryResult};
use dirsrv_session::Session;
use dirsrv_store::PartitionNexus;
use std::sync::Arc;

pub struct ExceptionInterceptor {
    nexus: Option<Arc<PartitionNexus>>,
}

impl ExceptionInterceptor {
    pub fn new() -> Self {
        Self { nexus: None }
    }

    pub fn with_nexus(mut self, nexus: Arc<PartitionNexus>) -> Self {
        self.nexus = Some(nexus);
        self
    }
}

impl Default for ExceptionInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

fn exists(nexus: &PartitionNexus, dn: &Dn) -> DirectoryResult<bool> {
    match nexus.route(dn) {
        Some(routed) => routed.with_store(|s| s.has_entry(dn)),
        None => Ok(false),
    }
}

impl Interceptor for ExceptionInterceptor {
    fn name(&self) -> &'static str {
        "exception"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        if let Some(nexus) = &self.nexus {
            match &ctx.payload {
                OperationPayload::Add { entry } => {
                    let dn = entry.dn();
                    if exists(nexus, dn)? {
                        return Err(DirectoryError::AlreadyExists(dn.clone()));
                    }
                    let Some(routed) = nexus.route(dn) else {
                        return Err(DirectoryError::NotFound(dn.clone()));
                    };
                    if !routed.suffix().equals(dn) {
                        let parent = dn
                            .parent()
                            .expect("a dn routed under a partition it isn't the suffix of has a parent");
                        if !exists(nexus, &parent)? {
                            return Err(DirectoryError::NotFound(parent));
                        }
                    }
                }
                OperationPayload::Delete { dn }
                | OperationPayload::Modify { dn, .. }
                | OperationPayload::Compare { dn, .. } => {
                    if !exists(nexus, dn)? {
                        return Err(DirectoryError::NotFound(dn.clone()));
                    }
                }
                OperationPayload::ModifyDn { dn, new_superior, .. } => {
                    if !exists(nexus, dn)? {
                        return Err(DirectoryError::NotFound(dn.clone()));
                    }
                    if let Some(new_superior) = new_superior {
                        if !exists(nexus, new_superior)? {
                            return Err(DirectoryError::NotFound(new_superior.clone()));
                        }
                        if new_superior.equals(dn) || new_superior.is_descendant_of(dn) {
                            return Err(DirectoryError::Unwilling(format!(
                                "cannot move {dn} onto itself or one of its own descendants"
                            )));
                        }
                        let current_partition = nexus.route(dn).map(|r| r.suffix());
                        let target_partition = nexus.route(new_superior).map(|r| r.suffix());
                        if current_partition != target_partition {
                            return Err(DirectoryError::Unwilling(
                                "moving an entry across partitions is not supported".to_string(),
                            ));
                        }
                    }
                }
                OperationPayload::Search { base, .. } => {
                    if !base.is_root() && !exists(nexus, base)? {
                        return Err(DirectoryError::NotFound(base.clone()));
                    }
                }
                OperationPayload::Bind { .. } | OperationPayload::Unbind => {}
            }
        }
        next.proceed(ctx, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::schema::bootstrap_registry;
    use dirsrv_core::{Entry, SchemaRegistry};
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

    fn nexus() -> (tempfile::TempDir, Arc<PartitionNexus>, Arc<SchemaRegistry>) {
        let schema = Arc::new(bootstrap_registry());
        let dir = tempfile::tempdir().unwrap();
        let suffix = Dn::from_str("dc=example").unwrap();
        let store = dirsrv_store::PartitionStore::open(dir.path(), suffix.clone()).unwrap();
        let nexus = PartitionNexus::new();
        nexus.mount(suffix, store);
        (dir, Arc::new(nexus), schema)
    }

    #[test]
    fn modify_on_missing_entry_is_not_found() {
        let (_dir, nexus, _schema) = nexus();
        let chain = crate::ChainBuilder::new()
            .push(ExceptionInterceptor::new().with_nexus(nexus))
            .terminal(AlwaysOk);
        let mut ctx = OperationContext::new(OperationPayload::Modify {
            dn: Dn::from_str("cn=ghost,dc=example").unwrap(),
            changes: vec![],
        });
        let mut session = Session::anonymous();
        assert!(matches!(
            chain.dispatch(&mut ctx, &mut session),
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[test]
    fn add_with_missing_parent_is_not_found() {
        let (_dir, nexus, _schema) = nexus();
        let chain = crate::ChainBuilder::new()
            .push(ExceptionInterceptor::new().with_nexus(nexus))
            .terminal(AlwaysOk);
        let entry = Entry::new(Dn::from_str("cn=a,ou=missing,dc=example").unwrap());
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        assert!(matches!(
            chain.dispatch(&mut ctx, &mut session),
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[test]
    fn add_at_mounted_suffix_is_allowed_through() {
        let (_dir, nexus, _schema) = nexus();
        let chain = crate::ChainBuilder::new()
            .push(ExceptionInterceptor::new().with_nexus(nexus))
            .terminal(AlwaysOk);
        let entry = Entry::new(Dn::from_str("dc=example").unwrap());
        let mut ctx = OperationContext::new(OperationPayload::Add { entry });
        let mut session = Session::anonymous();
        assert!(chain.dispatch(&mut ctx, &mut session).is_ok());
    }
}
