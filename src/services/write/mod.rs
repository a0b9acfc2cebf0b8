//! Write handlers: stream an object source into metachunks and push each one
//! to its slots according to the redundancy scheme.
//!
//! The source is consumed one metachunk at a time, so memory use is bounded
//! by the chunk size regardless of the object size.

pub mod cold;
pub mod ec;
pub mod replicated;

use self::{cold::ColdWriteHandler, ec::EcWriteHandler, replicated::ReplicatedWriteHandler};
use super::placement::MetachunkPreparer;
use crate::{
    clients::ChunkWriteMeta,
    context::RequestContext,
    errors::{OioError, OioResult},
    models::chunk::{ChunkDescriptor, ChunkPosition},
};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use std::{fmt, io, path::PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Where the bytes of a new object come from.
pub enum ObjectSource {
    /// Data already in memory.
    Bytes(Bytes),
    /// One-shot stream, consumed once.
    Stream(BoxStream<'static, io::Result<Bytes>>),
    /// File on the local filesystem.
    Path(PathBuf),
}

impl fmt::Debug for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectSource::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            ObjectSource::Stream(_) => write!(f, "Stream"),
            ObjectSource::Path(path) => write!(f, "Path({})", path.display()),
        }
    }
}

impl From<Bytes> for ObjectSource {
    fn from(data: Bytes) -> Self {
        ObjectSource::Bytes(data)
    }
}

impl From<Vec<u8>> for ObjectSource {
    fn from(data: Vec<u8>) -> Self {
        ObjectSource::Bytes(Bytes::from(data))
    }
}

/// Cuts a source into metachunk-sized buffers.
pub struct SourceReader {
    stream: BoxStream<'static, io::Result<Bytes>>,
    pending: BytesMut,
    eof: bool,
}

impl SourceReader {
    pub async fn open(source: ObjectSource) -> OioResult<Self> {
        let stream = match source {
            ObjectSource::Bytes(data) => futures::stream::iter([Ok(data)]).boxed(),
            ObjectSource::Stream(stream) => stream,
            ObjectSource::Path(path) => {
                let file = File::open(&path).await.map_err(|err| {
                    if err.kind() == io::ErrorKind::NotFound {
                        OioError::FileNotFound(path.display().to_string())
                    } else {
                        OioError::Io(err)
                    }
                })?;
                ReaderStream::new(file).boxed()
            }
        };
        Ok(Self {
            stream,
            pending: BytesMut::new(),
            eof: false,
        })
    }

    /// Next buffer of at most `size` bytes, `None` once the source is drained.
    pub async fn read_metachunk(&mut self, size: usize) -> OioResult<Option<Bytes>> {
        while self.pending.len() < size && !self.eof {
            match self.stream.next().await {
                Some(Ok(data)) => self.pending.extend_from_slice(&data),
                Some(Err(err)) => return Err(OioError::SourceRead(err.to_string())),
                None => self.eof = true,
            }
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = size.min(self.pending.len());
        Ok(Some(self.pending.split_to(take).freeze()))
    }
}

/// Identity every chunk of the upload is bound to.
#[derive(Clone, Debug)]
pub struct ChunkTarget {
    pub full_path: String,
    pub content_id: String,
    pub container_id: String,
}

impl ChunkTarget {
    pub fn write_meta(&self, pos: ChunkPosition, metachunk_size: u64) -> ChunkWriteMeta {
        ChunkWriteMeta {
            full_path: self.full_path.clone(),
            content_id: self.content_id.clone(),
            container_id: self.container_id.clone(),
            pos,
            metachunk_size,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub chunks: Vec<ChunkDescriptor>,
    pub bytes: u64,
    /// Upper-case MD5 of everything read from the source.
    pub checksum: String,
}

pub enum WriteHandler {
    Replicated(ReplicatedWriteHandler),
    Ec(EcWriteHandler),
    Cold(ColdWriteHandler),
}

impl WriteHandler {
    /// Drain `source` into chunks. An empty new object still gets one empty
    /// metachunk so it has a location.
    pub async fn stream(
        &self,
        ctx: &RequestContext,
        source: &mut SourceReader,
        preparer: &mut MetachunkPreparer,
    ) -> OioResult<UploadOutcome> {
        let chunk_size = preparer.meta.chunk_size.max(1) as usize;
        let mut checksum = Context::new();
        let mut chunks = Vec::new();
        let first_position = preparer.meta.first_position;
        let first_offset = preparer.meta.first_offset;
        let mut offset = first_offset;
        let mut position = first_position;

        loop {
            let data = match source.read_metachunk(chunk_size).await? {
                Some(data) => data,
                None if position == 0 && first_offset == 0 => Bytes::new(),
                None => break,
            };
            checksum.consume(&data);
            let slots = preparer.slots_for(ctx, position).await?;
            let mut written = match self {
                WriteHandler::Replicated(handler) => {
                    handler.write_metachunk(ctx, &slots, data.clone()).await?
                }
                WriteHandler::Ec(handler) => handler.write_metachunk(ctx, &slots, data.clone()).await?,
                WriteHandler::Cold(handler) => {
                    handler.write_metachunk(ctx, &slots, data.clone()).await?
                }
            };
            for chunk in &mut written {
                chunk.offset = Some(offset);
            }
            debug!(position, size = data.len(), chunks = written.len(), "metachunk written");
            chunks.extend(written);
            offset += data.len() as u64;
            position += 1;
            if data.len() < chunk_size {
                break;
            }
        }

        Ok(UploadOutcome {
            chunks,
            bytes: offset - first_offset,
            checksum: format!("{:X}", checksum.compute()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_reader_regroups_stream_items() {
        let parts: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defgh")),
            Ok(Bytes::from_static(b"i")),
        ];
        let mut reader = SourceReader::open(ObjectSource::Stream(futures::stream::iter(parts).boxed()))
            .await
            .unwrap();
        assert_eq!(reader.read_metachunk(4).await.unwrap().unwrap(), "abcd");
        assert_eq!(reader.read_metachunk(4).await.unwrap().unwrap(), "efgh");
        assert_eq!(reader.read_metachunk(4).await.unwrap().unwrap(), "i");
        assert!(reader.read_metachunk(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn source_errors_surface_as_source_read() {
        let parts: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer gone")),
        ];
        let mut reader = SourceReader::open(ObjectSource::Stream(futures::stream::iter(parts).boxed()))
            .await
            .unwrap();
        assert!(matches!(
            reader.read_metachunk(8).await,
            Err(OioError::SourceRead(_))
        ));
    }

    #[tokio::test]
    async fn missing_path_is_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let result = SourceReader::open(ObjectSource::Path(tmp.path().join("nope"))).await;
        assert!(matches!(result, Err(OioError::FileNotFound(_))));
    }
}
