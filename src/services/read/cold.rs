//! Cold-storage reads, one provider request per metachunk.

use super::Segment;
use crate::{
    clients::{ColdCredentials, ColdStorage},
    context::RequestContext,
    errors::{OioError, OioResult},
};
use bytes::Bytes;
use std::sync::Arc;

/// `(offset, size)` to request from the provider for a chunk of
/// `chunk_size` bytes. Without a range the whole chunk is read.
pub fn sub_range(chunk_size: u64, range: Option<(u64, u64)>) -> (u64, u64) {
    let offset = range.map(|(start, _)| start).unwrap_or(0);
    let size = range
        .map(|(start, end)| end - start + 1)
        .unwrap_or(chunk_size);
    (offset, size)
}

pub struct ColdReader {
    cold: Arc<dyn ColdStorage>,
    creds: ColdCredentials,
}

impl ColdReader {
    pub fn new(cold: Arc<dyn ColdStorage>, creds: ColdCredentials) -> Self {
        Self { cold, creds }
    }

    pub async fn read(&self, ctx: &RequestContext, segment: &Segment) -> OioResult<Bytes> {
        let chunk = segment.metachunk.chunks.first().ok_or_else(|| {
            OioError::UnrecoverableContent(format!(
                "no chunk for metachunk {}",
                segment.metachunk.pos
            ))
        })?;
        let (offset, size) = sub_range(segment.metachunk.size, segment.range);
        let data = self
            .cold
            .download(ctx, &self.creds, chunk.chunk_id(), offset, size)
            .await?;
        if data.is_empty() {
            return Err(OioError::Oio("error while downloading".into()));
        }
        if data.len() as u64 != size {
            return Err(OioError::CorruptedChunk(format!(
                "{}: {} bytes downloaded, {size} expected",
                chunk.url,
                data.len()
            )));
        }
        Ok(data)
    }
}
