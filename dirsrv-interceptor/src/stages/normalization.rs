//! First stage of the chain: canonicalize every DN and entry in the
//! payload before any other stage sees it, so nothing downstream has to
//! cope with a client-supplied DN that hasn't been schema-normalized yet.

use crate::chain::{Interceptor, Invocation};
use crate::outcome::OperationOutcome;
use dirsrv_context::{OperationContext, OperationPayload};
use dirsrv_core::{Dn, DirectoryResult, SchemaRegistry};
use dirsrv_session::Session;
use std::sync::Arc;

pub struct NormalizationInterceptor {
    schema: Arc<SchemaRegistry>,
}

impl NormalizationInterceptor {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self { schema }
    }
}

impl Interceptor for NormalizationInterceptor {
    fn name(&self) -> &'static str {
        "normalization"
    }

    fn invoke(
        &self,
        ctx: &mut OperationContext,
        session: &mut Session,
        next: Invocation<'_>,
    ) -> DirectoryResult<OperationOutcome> {
        normalize_payload(&mut ctx.payload, &self.schema)?;
        next.proceed(ctx, session)
    }
}

fn normalize_payload(payload: &mut OperationPayload, schema: &SchemaRegistry) -> DirectoryResult<()> {
    match payload {
        OperationPayload::Bind { name, .. } => name.normalize(schema)?,
        OperationPayload::Add { entry } => entry.normalize(schema)?,
        OperationPayload::Delete { dn } => dn.normalize(schema)?,
        OperationPayload::Modify { dn, .. } => dn.normalize(schema)?,
        OperationPayload::ModifyDn {
            dn,
            new_rdn,
            new_superior,
            ..
        } => {
            dn.normalize(schema)?;
            if let Some(superior) = new_superior {
                superior.normalize(schema)?;
            }
            let mut as_dn = Dn::from_rdns(vec![new_rdn.clone()]);
            as_dn.normalize(schema)?;
            *new_rdn = as_dn
                .rdn(0)
                .expect("single-RDN Dn always has an rdn at index 0")
                .clone();
        }
        OperationPayload::Compare { dn, .. } => dn.normalize(schema)?,
        OperationPayload::Search { base, .. } => base.normalize(schema)?,
        OperationPayload::Unbind => {}
    }
    Ok(())
}
