//! The operation manager: the public façade a transport collaborator
//! drives (`bind`/`add`/`delete`/`modify`/`compare`/`search`/`rename`/
//! `move`/`moveAndRename`/`unbind`), wiring a partition nexus, a session
//! table and the default interceptor chain together.
//!
//! Every method here does the same four things the façade's own doc
//! section describes: validate inputs, construct a context, invoke the
//! chain, collect the outcome. Nothing here talks to a partition
//! directly — that's `dirsrv_interceptor::stages::nexus` by way of the
//! chain.

use crate::error::{ServerError, ServerResult};
use dirsrv_changelog::{ChangeLog, InMemoryChangeLog};
use dirsrv_context::{AliasDereferencing as CtxDeref, OperationContext, OperationPayload, SearchScope};
use dirsrv_core::schema::bootstrap_registry;
use dirsrv_core::{
    Dn, DirectoryConfig, Entry, EntryId, Filter, HealthCheck, Modification, Rdn, ReplicaId, SchemaRegistry,
};
use dirsrv_interceptor::{Chain, CredentialVerifier, OperationOutcome};
use dirsrv_session::{ConnectionPolicies, Session, SessionId};
use dirsrv_store::PartitionNexus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The assembled server: owns the nexus, the default chain and every
/// open session. Safe to share across worker threads behind an `Arc`;
/// every method takes `&self`.
pub struct DirectoryServer {
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
    chain: Chain,
    default_size_limit: Option<u64>,
    default_time_limit: Duration,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl DirectoryServer {
    /// Read and parse a TOML configuration file, then [`Self::open`] it.
    pub fn open_config_file(path: &str) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigIo {
            path: path.to_string(),
            source,
        })?;
        let config = DirectoryConfig::from_toml_str(&text)?;
        Self::open(config)
    }

    /// Mount every configured partition, build the default interceptor
    /// chain (loading the subentry cache in the process) and return a
    /// server ready to open sessions against.
    pub fn open(config: DirectoryConfig) -> ServerResult<Self> {
        Self::open_with_verifier_hook(config, |schema, nexus| {
            Arc::new(crate::credentials::StoreCredentialVerifier::new(schema, nexus))
        })
    }

    /// As [`Self::open`], but lets a caller supply its own
    /// [`CredentialVerifier`] (tests that want a fixed credential set
    /// rather than one backed by `userPassword` lookups).
    pub fn open_with_verifier_hook(
        config: DirectoryConfig,
        make_verifier: impl FnOnce(Arc<SchemaRegistry>, Arc<PartitionNexus>) -> Arc<dyn CredentialVerifier>,
    ) -> ServerResult<Self> {
        let schema = Arc::new(bootstrap_registry());
        let nexus = Arc::new(dirsrv_store::nexus_from_config(&config, &schema)?);
        let csn_factory = Arc::new(dirsrv_core::CsnFactory::new(ReplicaId(config.replica_id)));
        let change_log: Arc<Mutex<Box<dyn ChangeLog + Send>>> =
            Arc::new(Mutex::new(Box::new(InMemoryChangeLog::new())));
        let verifier = make_verifier(schema.clone(), nexus.clone());
        let chain = dirsrv_interceptor::default_chain(schema.clone(), nexus.clone(), csn_factory, change_log, verifier)?;
        Ok(Self {
            schema,
            nexus,
            chain,
            default_size_limit: config.limits.default_size_limit,
            default_time_limit: config.limits.default_time_limit,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Open a fresh, anonymous session (as a transport collaborator does
    /// on accepting a new connection, before any bind). Returns the id
    /// used to address every subsequent operation against it.
    pub fn open_session(&self) -> SessionId {
        let session = Session::anonymous().with_policies(ConnectionPolicies {
            default_size_limit: self.default_size_limit,
            default_time_limit: Some(self.default_time_limit),
            ..ConnectionPolicies::default()
        });
        let id = session.id();
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).insert(id, session);
        id
    }

    /// Drop a session's state (the transport collaborator calls this
    /// once the underlying connection actually closes, whether or not an
    /// `unbind` operation preceded it).
    pub fn close_session(&self, id: SessionId) {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
    }

    fn dispatch(&self, id: SessionId, ctx_builder: impl FnOnce(&Session) -> OperationContext) -> ServerResult<OperationOutcome> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get_mut(&id).ok_or(ServerError::UnknownSession)?;
        let mut ctx = ctx_builder(session);
        Ok(self.chain.dispatch(&mut ctx, session)?)
    }

    pub fn bind(&self, id: SessionId, name: Dn, credentials: Vec<u8>) -> ServerResult<()> {
        self.dispatch(id, |_| OperationContext::new(OperationPayload::Bind { name, credentials }))?;
        Ok(())
    }

    pub fn unbind(&self, id: SessionId) -> ServerResult<()> {
        self.dispatch(id, |_| OperationContext::new(OperationPayload::Unbind))?;
        Ok(())
    }

    pub fn add(&self, id: SessionId, entry: Entry) -> ServerResult<EntryId> {
        let outcome = self.dispatch(id, |_| OperationContext::new(OperationPayload::Add { entry }))?;
        match outcome {
            OperationOutcome::Added(entry_id) => Ok(entry_id),
            other => unreachable!("add dispatch produced {other:?}"),
        }
    }

    pub fn delete(&self, id: SessionId, dn: Dn) -> ServerResult<()> {
        self.dispatch(id, |_| OperationContext::new(OperationPayload::Delete { dn }))?;
        Ok(())
    }

    pub fn modify(&self, id: SessionId, dn: Dn, changes: Vec<Modification>) -> ServerResult<()> {
        self.dispatch(id, |_| OperationContext::new(OperationPayload::Modify { dn, changes }))?;
        Ok(())
    }

    /// Pure RDN change under the same parent.
    pub fn rename(&self, id: SessionId, dn: Dn, new_rdn: Rdn, delete_old_rdn: bool) -> ServerResult<Dn> {
        self.move_and_rename_dn(id, dn, new_rdn, delete_old_rdn, None)
    }

    /// Relocate under a new parent, RDN unchanged.
    pub fn move_entry(&self, id: SessionId, dn: Dn, new_superior: Dn) -> ServerResult<Dn> {
        let rdn = dn.leaf_rdn().cloned().ok_or(ServerError::Directory(dirsrv_core::DirectoryError::NotAllowedOnRdn(dn.clone())))?;
        self.move_and_rename_dn(id, dn, rdn, false, Some(new_superior))
    }

    /// Move and rename in one atomic step.
    pub fn move_and_rename(
        &self,
        id: SessionId,
        dn: Dn,
        new_superior: Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
    ) -> ServerResult<Dn> {
        self.move_and_rename_dn(id, dn, new_rdn, delete_old_rdn, Some(new_superior))
    }

    fn move_and_rename_dn(
        &self,
        id: SessionId,
        dn: Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
        new_superior: Option<Dn>,
    ) -> ServerResult<Dn> {
        let outcome = self.dispatch(id, |_| {
            OperationContext::new(OperationPayload::ModifyDn {
                dn,
                new_rdn,
                delete_old_rdn,
                new_superior,
            })
        })?;
        match outcome {
            OperationOutcome::Renamed(new_dn) => Ok(new_dn),
            other => unreachable!("modify-dn dispatch produced {other:?}"),
        }
    }

    pub fn compare(&self, id: SessionId, dn: Dn, attribute: String, value: String) -> ServerResult<bool> {
        let outcome = self.dispatch(id, |_| OperationContext::new(OperationPayload::Compare { dn, attribute, value }))?;
        match outcome {
            OperationOutcome::Compared(result) => Ok(result),
            other => unreachable!("compare dispatch produced {other:?}"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        id: SessionId,
        base: Dn,
        scope: SearchScope,
        filter: Filter,
        deref: CtxDeref,
        attributes: Vec<String>,
        size_limit: Option<u64>,
        time_limit: Option<Duration>,
    ) -> ServerResult<Vec<Entry>> {
        let outcome = self.dispatch(id, |session| {
            let mut ctx = OperationContext::new(OperationPayload::Search {
                base,
                scope,
                filter,
                attributes,
                types_only: false,
            })
            .with_alias_dereferencing(deref);
            let size_limit = size_limit.or(session.policies().default_size_limit);
            let time_limit = time_limit.or(session.policies().default_time_limit);
            if let Some(limit) = size_limit {
                ctx = ctx.with_size_limit(limit);
            }
            if let Some(limit) = time_limit {
                ctx = ctx.with_time_limit(limit);
            }
            ctx
        })?;
        Ok(outcome.into_search_results().unwrap_or_default())
    }

    /// The schema registry this server was opened with, for a transport
    /// collaborator that needs to parse incoming DN/filter text itself.
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn health(&self) -> HealthCheck {
        if self.nexus.naming_contexts().is_empty() {
            return HealthCheck::degraded("directory-server", "no partitions mounted");
        }
        HealthCheck::healthy("directory-server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsrv_core::{AttributeValue, PartitionConfig};
    use std::str::FromStr;

    fn config(dir: &std::path::Path) -> DirectoryConfig {
        DirectoryConfig {
            partitions: vec![PartitionConfig {
                suffix: "dc=example".to_string(),
                data_dir: dir.to_string_lossy().into_owned(),
                map_size_mb: 64,
                indexed_attributes: Vec::new(),
            }],
            limits: Default::default(),
            replica_id: 1,
        }
    }

    #[test]
    fn anonymous_bind_add_and_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let server = DirectoryServer::open(config(dir.path())).unwrap();
        let session = server.open_session();
        server.bind(session, Dn::root(), vec![]).unwrap();

        let schema = server.schema().clone();
        let dn = Dn::from_str("dc=example").unwrap();
        let mut entry = Entry::new(dn.clone());
        entry
            .add_values("objectClass", vec![AttributeValue::utf8("top"), AttributeValue::utf8("domain")], &schema)
            .unwrap();
        entry.add_values("dc", vec![AttributeValue::utf8("example")], &schema).unwrap();
        server.add(session, entry).unwrap();

        let results = server
            .search(
                session,
                dn.clone(),
                SearchScope::Base,
                Filter::Present { attr: "objectClass".to_string() },
                CtxDeref::Never,
                vec![],
                None,
                None,
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].dn().equals(&dn));
    }

    #[test]
    fn unknown_session_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let server = DirectoryServer::open(config(dir.path())).unwrap();
        let bogus = server.open_session();
        server.close_session(bogus);
        assert!(matches!(server.bind(bogus, Dn::root(), vec![]), Err(ServerError::UnknownSession)));
    }
}
