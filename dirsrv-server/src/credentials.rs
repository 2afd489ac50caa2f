//! The credential verifier the façade hands to
//! [`dirsrv_interceptor::AuthenticationInterceptor`]: it is the one
//! component that both holds a [`PartitionNexus`] handle and is allowed to
//! know that `userPassword` is where simple-bind credentials live.

use dirsrv_core::{Dn, RawValue, SchemaRegistry};
use dirsrv_interceptor::CredentialVerifier;
use dirsrv_store::PartitionNexus;
use std::sync::Arc;

pub struct StoreCredentialVerifier {
    schema: Arc<SchemaRegistry>,
    nexus: Arc<PartitionNexus>,
}

impl StoreCredentialVerifier {
    pub fn new(schema: Arc<SchemaRegistry>, nexus: Arc<PartitionNexus>) -> Self {
        Self { schema, nexus }
    }
}

impl CredentialVerifier for StoreCredentialVerifier {
    fn verify_simple(&self, principal: &Dn, credentials: &[u8]) -> bool {
        let Some(routed) = self.nexus.route(principal) else {
            return false;
        };
        let Ok(Some(entry)) = routed.with_store(|s| s.lookup(principal)) else {
            return false;
        };
        let Some(values) = entry.values("userPassword", &self.schema) else {
            return false;
        };
        values.iter().any(|v| match &v.raw {
            RawValue::Binary(b) => b.as_slice() == credentials,
            RawValue::Utf8(s) => s.as_bytes() == credentials,
        })
    }
}
