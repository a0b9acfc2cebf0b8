//! Erasure-coded reads: gather every fragment of the metachunk, rebuild it,
//! and cut the requested range out of it.

use super::Segment;
use crate::{
    clients::BlobClient,
    context::RequestContext,
    errors::{OioError, OioResult},
    services::{erasure::ErasureCodec, storage_method::EcParams},
};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

pub struct EcReader {
    blob: Arc<dyn BlobClient>,
    params: EcParams,
    codec: Arc<dyn ErasureCodec>,
}

impl EcReader {
    pub fn new(blob: Arc<dyn BlobClient>, params: EcParams, codec: Arc<dyn ErasureCodec>) -> Self {
        Self { blob, params, codec }
    }

    pub async fn read(&self, ctx: &RequestContext, segment: &Segment) -> OioResult<Bytes> {
        let metachunk = &segment.metachunk;
        let width = self.params.k + self.params.m;
        let fetches = metachunk
            .chunks
            .iter()
            .filter_map(|chunk| {
                let idx = chunk.pos.sub? as usize;
                (idx < width).then_some((idx, chunk))
            })
            .map(|(idx, chunk)| async move {
                (idx, chunk, self.blob.chunk_get(ctx, &chunk.url, None).await)
            });

        let mut fragments: Vec<Option<Bytes>> = vec![None; width];
        for (idx, chunk, result) in join_all(fetches).await {
            match result {
                Ok(data) => fragments[idx] = Some(data),
                Err(err) => warn!(url = %chunk.url, error = %err, "fragment read failed"),
            }
        }

        let data = self
            .codec
            .decode(&self.params, &fragments, metachunk.size as usize)?;
        match segment.range {
            None => Ok(data),
            Some((start, end)) => {
                let (start, end) = (start as usize, end as usize);
                if end >= data.len() {
                    return Err(OioError::UnsatisfiableRange(format!(
                        "{start}-{end} past metachunk {} of {} bytes",
                        metachunk.pos,
                        data.len()
                    )));
                }
                Ok(data.slice(start..=end))
            }
        }
    }
}
