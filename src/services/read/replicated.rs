//! Replicated reads: try each replica in turn until one answers.

use super::Segment;
use crate::{
    clients::BlobClient,
    context::RequestContext,
    errors::{OioError, OioResult},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;

pub struct ReplicatedReader {
    blob: Arc<dyn BlobClient>,
}

impl ReplicatedReader {
    pub fn new(blob: Arc<dyn BlobClient>) -> Self {
        Self { blob }
    }

    pub async fn read(&self, ctx: &RequestContext, segment: &Segment) -> OioResult<Bytes> {
        let expected = segment.len();
        let mut last_error = None;
        for chunk in &segment.metachunk.chunks {
            match self.blob.chunk_get(ctx, &chunk.url, segment.range).await {
                Ok(data) if data.len() as u64 == expected => return Ok(data),
                Ok(data) => {
                    warn!(url = %chunk.url, got = data.len(), expected, "short read from replica");
                    last_error = Some(OioError::CorruptedChunk(chunk.url.clone()));
                }
                Err(err) => {
                    warn!(url = %chunk.url, error = %err, "replica read failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            OioError::UnrecoverableContent(format!(
                "no chunk for metachunk {}",
                segment.metachunk.pos
            ))
        }))
    }
}
