//! The interceptor chain: the ordered sequence of cross-cutting stages
//! every directory operation passes through between the operation-manager
//! façade and the partition nexus.
//!
//! Each stage inspects or transforms the [`dirsrv_context::OperationContext`]
//! and the current [`dirsrv_session::Session`], then either hands the
//! operation to the next stage or short-circuits with a result of its own
//! (an error, or for search, a materialized result set). The terminal
//! stage is always [`stages::nexus::NexusInterceptor`], which is the only
//! stage that actually talks to a [`dirsrv_store::PartitionNexus`].

mod chain;
mod outcome;
mod stages;

pub use chain::{Chain, ChainBuilder, Interceptor, Invocation};
pub use outcome::OperationOutcome;

pub use stages::authentication::{AuthenticationInterceptor, CredentialVerifier};
pub use stages::authorization::{
    AciAuthorizationInterceptor, AdministrativePoint, DefaultAuthorizationInterceptor, Permission,
};
pub use stages::changelog::{ChangeLogInterceptor, ChangeLogRevertExt};
pub use stages::collective_attribute::CollectiveAttributeInterceptor;
pub use stages::event::{EventInterceptor, EventListener, OperationEvent};
pub use stages::exception::ExceptionInterceptor;
pub use stages::nexus::NexusInterceptor;
pub use stages::normalization::NormalizationInterceptor;
pub use stages::operational_attribute::OperationalAttributeInterceptor;
pub use stages::referral::ReferralInterceptor;
pub use stages::schema::SchemaInterceptor;
pub use stages::subentry::{SubentryAdministrationPoint, SubentryInterceptor, SubtreeScope, SubtreeSpecification};
pub use stages::trigger::{Trigger, TriggerInterceptor, TriggerKind};

use dirsrv_changelog::ChangeLog;
use dirsrv_core::{CsnFactory, DirectoryResult, SchemaRegistry};
use dirsrv_store::PartitionNexus;
use std::sync::{Arc, Mutex};

/// Build the default chain, in the order spec'd for a directory operation:
/// normalization, authentication, referral, the two authorization stages,
/// exception translation, change logging, operational-attribute
/// maintenance, schema checking, subentry administration, collective
/// attributes, event notification, triggers, and finally the nexus
/// dispatch. Any stage can be removed or replaced by building a
/// [`ChainBuilder`] directly instead of calling this.
///
/// Loads the subentry cache before returning, so call this only after
/// every partition named in the configuration is mounted on `nexus`.
#[allow(clippy::too_many_arguments)]
pub fn default_chain(
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
    csn_factory: Arc<CsnFactory>,
    change_log: Arc<Mutex<Box<dyn ChangeLog + Send>>>,
    verifier: Arc<dyn CredentialVerifier>,
) -> DirectoryResult<Chain> {
    let subentry = SubentryInterceptor::new(schema.clone(), nexus.clone());
    subentry.load_cache()?;
    Ok(ChainBuilder::new()
        .push(NormalizationInterceptor::new(schema.clone()))
        .push(AuthenticationInterceptor::new(schema.clone()).with_verifier(verifier))
        .push(ReferralInterceptor::new().with_nexus(schema.clone(), nexus.clone()))
        .push(AciAuthorizationInterceptor::new(schema.clone(), nexus.clone()))
        .push(DefaultAuthorizationInterceptor::new())
        .push(ExceptionInterceptor::new().with_nexus(nexus.clone()))
        .push(ChangeLogInterceptor::new(csn_factory.clone()).with_log(change_log, nexus.clone(), schema.clone()))
        .push(OperationalAttributeInterceptor::new(schema.clone(), csn_factory).with_nexus(nexus.clone()))
        .push(SchemaInterceptor::new(schema.clone()))
        .push(subentry)
        .push(CollectiveAttributeInterceptor::new(schema.clone(), nexus.clone()))
        .push(EventInterceptor::new())
        .push(TriggerInterceptor::new())
        .terminal(NexusInterceptor::new(schema, nexus)))
}
