//! Chunk placement: asks the directory for slots, one metachunk at a time,
//! and remembers every slot handed out so a failed upload can be rolled back.

use crate::{
    clients::{DirectoryClient, PrepareRequest, PreparedMeta},
    context::RequestContext,
    errors::OioResult,
    models::chunk::{ChunkDescriptor, ChunkSlot},
};
use std::sync::Arc;
use tracing::debug;

pub struct MetachunkPreparer {
    directory: Arc<dyn DirectoryClient>,
    request: PrepareRequest,
    pub meta: PreparedMeta,
    first: Option<Vec<ChunkSlot>>,
    handed_out: Vec<ChunkSlot>,
}

impl MetachunkPreparer {
    /// Reserve the object identity and the slots of the first metachunk.
    pub async fn prepare(
        directory: Arc<dyn DirectoryClient>,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        policy: Option<&str>,
        append: bool,
    ) -> OioResult<Self> {
        let request = PrepareRequest {
            account: account.to_string(),
            container: container.to_string(),
            name: name.to_string(),
            policy: policy.map(str::to_string),
            position: 0,
            append,
        };
        let prepared = directory.content_prepare(ctx, &request).await?;
        debug!(
            content_id = %prepared.meta.content_id,
            version = prepared.meta.version,
            chunk_method = %prepared.meta.chunk_method,
            "content prepared"
        );
        Ok(Self {
            directory,
            request,
            meta: prepared.meta,
            first: Some(prepared.chunks),
            handed_out: Vec::new(),
        })
    }

    /// Slots for metachunk `position`. The first metachunk reuses the slots
    /// returned with the object identity.
    pub async fn slots_for(
        &mut self,
        ctx: &RequestContext,
        position: u32,
    ) -> OioResult<Vec<ChunkSlot>> {
        let slots = match self.first.take() {
            Some(first) if position == self.meta.first_position => first,
            _ => {
                let request = PrepareRequest {
                    position,
                    ..self.request.clone()
                };
                self.directory.content_prepare(ctx, &request).await?.chunks
            }
        };
        self.handed_out.extend(slots.iter().cloned());
        Ok(slots)
    }

    /// Every slot handed out so far, written or not, as descriptors
    /// suitable for the reaper.
    pub fn all_chunks_so_far(&self) -> Vec<ChunkDescriptor> {
        self.handed_out
            .iter()
            .map(|slot| ChunkDescriptor::new(slot.url.clone(), slot.pos, 0, ""))
            .collect()
    }
}
