//! Read paths: turn one planned segment of a metachunk into bytes.

pub mod cold;
pub mod ec;
pub mod replicated;

use self::{cold::ColdReader, ec::EcReader, replicated::ReplicatedReader};
use crate::{context::RequestContext, errors::OioResult, models::chunk::ChunkDescriptor};
use bytes::Bytes;
use std::sync::Arc;

/// The chunks of one metachunk, placed in the object.
#[derive(Clone, Debug, PartialEq)]
pub struct Metachunk {
    pub pos: u32,
    /// Offset of the first byte in the object.
    pub offset: u64,
    pub size: u64,
    /// Sorted by position.
    pub chunks: Vec<ChunkDescriptor>,
}

/// Part of a metachunk to read. `range` is inclusive and relative to the
/// metachunk; `None` reads all of it.
#[derive(Clone, Debug)]
pub struct Segment {
    pub metachunk: Arc<Metachunk>,
    pub range: Option<(u64, u64)>,
}

impl Segment {
    pub fn len(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.metachunk.size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub enum ChunkReader {
    Replicated(ReplicatedReader),
    Ec(EcReader),
    Cold(ColdReader),
}

impl ChunkReader {
    pub async fn read(&self, ctx: &RequestContext, segment: &Segment) -> OioResult<Bytes> {
        ctx.check_deadline()?;
        match self {
            ChunkReader::Replicated(reader) => reader.read(ctx, segment).await,
            ChunkReader::Ec(reader) => reader.read(ctx, segment).await,
            ChunkReader::Cold(reader) => reader.read(ctx, segment).await,
        }
    }
}
