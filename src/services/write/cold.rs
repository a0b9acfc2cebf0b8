//! Cold-storage writes: one chunk per metachunk, uploaded to the external
//! provider under the slot's chunk id.

use crate::{
    clients::{ColdCredentials, ColdStorage},
    context::RequestContext,
    errors::{OioError, OioResult},
    models::chunk::{ChunkDescriptor, ChunkSlot, chunk_id_of},
};
use bytes::Bytes;
use std::sync::Arc;

pub struct ColdWriteHandler {
    cold: Arc<dyn ColdStorage>,
    creds: ColdCredentials,
}

impl ColdWriteHandler {
    pub fn new(cold: Arc<dyn ColdStorage>, creds: ColdCredentials) -> Self {
        Self { cold, creds }
    }

    pub async fn write_metachunk(
        &self,
        ctx: &RequestContext,
        slots: &[ChunkSlot],
        data: Bytes,
    ) -> OioResult<Vec<ChunkDescriptor>> {
        let slot = slots
            .first()
            .ok_or_else(|| OioError::Oio("no chunk slot for cold storage".into()))?;
        let size = data.len() as u64;
        let hash = self
            .cold
            .upload(ctx, &self.creds, chunk_id_of(&slot.url), data)
            .await?;
        Ok(vec![ChunkDescriptor::new(slot.url.clone(), slot.pos, size, hash)])
    }
}
