//! Replicated writes: every slot of a metachunk receives the same bytes.

use super::ChunkTarget;
use crate::{
    clients::BlobClient,
    context::RequestContext,
    errors::{OioError, OioResult},
    models::chunk::{ChunkDescriptor, ChunkSlot},
};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct ReplicatedWriteHandler {
    blob: Arc<dyn BlobClient>,
    target: ChunkTarget,
    quorum: usize,
}

impl ReplicatedWriteHandler {
    pub fn new(blob: Arc<dyn BlobClient>, target: ChunkTarget, quorum: usize) -> Self {
        Self {
            blob,
            target,
            quorum,
        }
    }

    /// Write all replicas concurrently; succeed once `quorum` of them landed.
    pub async fn write_metachunk(
        &self,
        ctx: &RequestContext,
        slots: &[ChunkSlot],
        data: Bytes,
    ) -> OioResult<Vec<ChunkDescriptor>> {
        let size = data.len() as u64;
        let puts = slots.iter().map(|slot| {
            let meta = self.target.write_meta(slot.pos, size);
            let data = data.clone();
            async move { (slot, self.blob.chunk_put(ctx, &slot.url, data, &meta).await) }
        });

        let mut written = Vec::with_capacity(slots.len());
        let mut first_error = None;
        for (slot, result) in join_all(puts).await {
            match result {
                Ok(done) => written.push(ChunkDescriptor::new(
                    slot.url.clone(),
                    slot.pos,
                    size,
                    done.hash,
                )),
                Err(err) => {
                    warn!(url = %slot.url, error = %err, "replica upload failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if written.len() < self.quorum {
            return Err(match (written.is_empty(), first_error) {
                (true, Some(err)) => err,
                _ => OioError::Oio(format!(
                    "quorum not reached: {}/{} replicas written",
                    written.len(),
                    self.quorum
                )),
            });
        }
        Ok(written)
    }
}
