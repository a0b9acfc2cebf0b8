//! Erasure-coded writes: a metachunk is split into `k + m` fragments, one
//! per slot `N.0 .. N.(k+m-1)`.

use super::ChunkTarget;
use crate::{
    clients::BlobClient,
    context::RequestContext,
    errors::{OioError, OioResult},
    models::chunk::{ChunkDescriptor, ChunkSlot},
    services::{erasure::ErasureCodec, storage_method::EcParams},
};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct EcWriteHandler {
    blob: Arc<dyn BlobClient>,
    target: ChunkTarget,
    params: EcParams,
    codec: Arc<dyn ErasureCodec>,
}

impl EcWriteHandler {
    pub fn new(
        blob: Arc<dyn BlobClient>,
        target: ChunkTarget,
        params: EcParams,
        codec: Arc<dyn ErasureCodec>,
    ) -> Self {
        Self {
            blob,
            target,
            params,
            codec,
        }
    }

    pub async fn write_metachunk(
        &self,
        ctx: &RequestContext,
        slots: &[ChunkSlot],
        data: Bytes,
    ) -> OioResult<Vec<ChunkDescriptor>> {
        let expected = self.params.k + self.params.m;
        if slots.len() < expected {
            return Err(OioError::Oio(format!(
                "not enough chunk slots: {} for {} fragments",
                slots.len(),
                expected
            )));
        }
        let mut slots = slots.to_vec();
        slots.sort_by_key(|slot| slot.pos);

        let size = data.len() as u64;
        let fragments = self.codec.encode(&self.params, &data)?;
        let puts = slots.iter().zip(fragments).map(|(slot, fragment)| {
            let meta = self.target.write_meta(slot.pos, size);
            async move { (slot, self.blob.chunk_put(ctx, &slot.url, fragment, &meta).await) }
        });

        let mut written = Vec::with_capacity(expected);
        for (slot, result) in join_all(puts).await {
            match result {
                Ok(done) => written.push(ChunkDescriptor::new(
                    slot.url.clone(),
                    slot.pos,
                    size,
                    done.hash,
                )),
                Err(err) => {
                    warn!(url = %slot.url, error = %err, "fragment upload failed");
                    return Err(err);
                }
            }
        }
        Ok(written)
    }
}
