//! Blob nodes on the local filesystem.
//!
//! A chunk url `http://<service>/<chunk_id>` maps to `<root>/<service>/<chunk_id>`.
//! Chunk attributes live next to the data in a JSON sidecar.

use super::{BlobClient, ChunkOwner, ChunkWriteMeta, ChunkWritten};
use crate::{
    context::RequestContext,
    errors::{OioError, OioResult},
    models::chunk::{ChunkPosition, ChunkProbe},
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

const ATTR_SUFFIX: &str = "attr";

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ChunkAttrs {
    full_path: String,
    content_id: String,
    container_id: String,
    pos: ChunkPosition,
    hash: String,
    size: u64,
    metachunk_size: u64,
}

#[derive(Clone, Debug)]
pub struct LocalBlobClient {
    root: PathBuf,
}

impl LocalBlobClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Data file of a chunk url.
    pub fn chunk_path(&self, url: &str) -> OioResult<PathBuf> {
        let invalid = || OioError::InvalidArgument(format!("invalid chunk url `{url}`"));
        let location = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .unwrap_or(url);
        let (service, chunk_id) = location.split_once('/').ok_or_else(invalid)?;
        let unsafe_part = |part: &str| part.is_empty() || part.contains("..") || part.contains('/');
        if unsafe_part(service) || unsafe_part(chunk_id) || chunk_id.contains('.') {
            return Err(invalid());
        }
        Ok(self.root.join(service).join(chunk_id))
    }

    async fn read_attrs(path: &Path, url: &str) -> OioResult<ChunkAttrs> {
        let raw = fs::read(path.with_extension(ATTR_SUFFIX))
            .await
            .map_err(missing_chunk(url))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write_attrs(path: &Path, attrs: &ChunkAttrs) -> OioResult<()> {
        fs::write(path.with_extension(ATTR_SUFFIX), serde_json::to_vec(attrs)?).await?;
        Ok(())
    }
}

fn missing_chunk(url: &str) -> impl FnOnce(io::Error) -> OioError + '_ {
    move |err| {
        if err.kind() == io::ErrorKind::NotFound {
            OioError::NotFound(format!("chunk {url}"))
        } else {
            OioError::Io(err)
        }
    }
}

#[async_trait]
impl BlobClient for LocalBlobClient {
    async fn chunk_put(
        &self,
        ctx: &RequestContext,
        url: &str,
        data: Bytes,
        meta: &ChunkWriteMeta,
    ) -> OioResult<ChunkWritten> {
        ctx.check_deadline()?;
        let path = self.chunk_path(url)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => OioError::Conflict(format!("chunk {url} already exists")),
                _ => OioError::Io(err),
            })?;
        file.write_all(&data).await?;
        file.flush().await?;

        let hash = format!("{:X}", md5::compute(&data));
        let attrs = ChunkAttrs {
            full_path: meta.full_path.clone(),
            content_id: meta.content_id.clone(),
            container_id: meta.container_id.clone(),
            pos: meta.pos,
            hash: hash.clone(),
            size: data.len() as u64,
            metachunk_size: meta.metachunk_size,
        };
        Self::write_attrs(&path, &attrs).await?;
        debug!(url, size = data.len(), pos = %meta.pos, "chunk stored");
        Ok(ChunkWritten {
            size: data.len() as u64,
            hash,
        })
    }

    async fn chunk_get(
        &self,
        ctx: &RequestContext,
        url: &str,
        range: Option<(u64, u64)>,
    ) -> OioResult<Bytes> {
        ctx.check_deadline()?;
        let path = self.chunk_path(url)?;
        let data = Bytes::from(fs::read(&path).await.map_err(missing_chunk(url))?);
        let Some((start, end)) = range else {
            return Ok(data);
        };
        let len = data.len() as u64;
        if start >= len || end < start {
            return Ok(Bytes::new());
        }
        Ok(data.slice(start as usize..=end.min(len - 1) as usize))
    }

    async fn chunk_head(&self, ctx: &RequestContext, url: &str) -> OioResult<ChunkProbe> {
        ctx.check_deadline()?;
        let path = self.chunk_path(url)?;
        let attrs = Self::read_attrs(&path, url).await?;
        let actual = fs::metadata(&path).await.map_err(missing_chunk(url))?.len();
        if actual != attrs.size {
            return Err(OioError::CorruptedChunk(format!(
                "{url}: {actual} bytes on disk, {} expected",
                attrs.size
            )));
        }
        Ok(ChunkProbe {
            chunk_size: attrs.size,
            chunk_hash: attrs.hash,
            full_path: attrs.full_path,
            content_id: attrs.content_id,
            chunk_pos: attrs.pos,
            metachunk_size: attrs.metachunk_size,
        })
    }

    async fn chunk_link(
        &self,
        ctx: &RequestContext,
        target: &str,
        copy: &str,
        owner: &ChunkOwner,
    ) -> OioResult<()> {
        ctx.check_deadline()?;
        let target_path = self.chunk_path(target)?;
        let copy_path = self.chunk_path(copy)?;
        let mut attrs = Self::read_attrs(&target_path, target).await?;
        if let Some(parent) = copy_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::hard_link(&target_path, &copy_path)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => OioError::Conflict(format!("chunk {copy} already exists")),
                _ => missing_chunk(target)(err),
            })?;
        attrs.full_path = owner.full_path.clone();
        attrs.content_id = owner.content_id.clone();
        attrs.container_id = owner.container_id.clone();
        Self::write_attrs(&copy_path, &attrs).await?;
        debug!(target, copy, "chunk linked");
        Ok(())
    }

    async fn chunk_delete(
        &self,
        ctx: &RequestContext,
        url: &str,
        container_id: Option<&str>,
    ) -> OioResult<()> {
        ctx.check_deadline()?;
        let path = self.chunk_path(url)?;
        let data = fs::metadata(&path).await;
        let attrs = Self::read_attrs(&path, url).await;
        match (data, &attrs) {
            (Err(err), Err(_)) => return Err(missing_chunk(url)(err)),
            (_, Ok(attrs)) => {
                if let Some(cid) = container_id.filter(|cid| *cid != attrs.container_id) {
                    return Err(OioError::ChunkException(format!(
                        "chunk {url} belongs to container {}, not {cid}",
                        attrs.container_id
                    )));
                }
            }
            (Ok(_), Err(_)) => warn!(url, "chunk has no attributes"),
        }
        for file in [path.clone(), path.with_extension(ATTR_SUFFIX)] {
            match fs::remove_file(&file).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_meta(pos: ChunkPosition) -> ChunkWriteMeta {
        ChunkWriteMeta {
            full_path: "acct/cont/obj/1".into(),
            content_id: "CONTENT".into(),
            container_id: "CID".into(),
            pos,
            metachunk_size: 10,
        }
    }

    #[test]
    fn urls_map_under_root() {
        let blob = LocalBlobClient::new("/srv/blob");
        assert_eq!(
            blob.chunk_path("http://blob-1/ABCD").unwrap(),
            PathBuf::from("/srv/blob/blob-1/ABCD")
        );
        assert!(blob.chunk_path("http://blob-1/../etc").is_err());
        assert!(blob.chunk_path("http://blob-1").is_err());
    }

    #[tokio::test]
    async fn put_get_head_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = LocalBlobClient::new(tmp.path());
        let ctx = RequestContext::new();
        let url = "http://blob-0/AAAA";

        let written = blob
            .chunk_put(&ctx, url, Bytes::from_static(b"0123456789"), &write_meta(ChunkPosition::meta(0)))
            .await
            .unwrap();
        assert_eq!(written.size, 10);
        assert_eq!(written.hash, format!("{:X}", md5::compute(b"0123456789")));

        let range = blob.chunk_get(&ctx, url, Some((2, 5))).await.unwrap();
        assert_eq!(&range[..], b"2345");
        let clamped = blob.chunk_get(&ctx, url, Some((8, 100))).await.unwrap();
        assert_eq!(&clamped[..], b"89");

        let probe = blob.chunk_head(&ctx, url).await.unwrap();
        assert_eq!(probe.full_path, "acct/cont/obj/1");
        assert_eq!(probe.chunk_size, 10);

        let foreign = blob.chunk_delete(&ctx, url, Some("OTHER")).await;
        assert!(matches!(foreign, Err(OioError::ChunkException(_))));
        blob.chunk_delete(&ctx, url, Some("CID")).await.unwrap();
        assert!(blob.chunk_delete(&ctx, url, None).await.unwrap_err().is_not_found());
        assert!(blob.chunk_get(&ctx, url, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn link_shares_data_under_new_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = LocalBlobClient::new(tmp.path());
        let ctx = RequestContext::new();

        blob.chunk_put(&ctx, "http://blob-0/SRC", Bytes::from_static(b"payload"), &write_meta(ChunkPosition::meta(0)))
            .await
            .unwrap();
        let owner = ChunkOwner {
            full_path: "acct/copy/obj/1".into(),
            content_id: "COPY".into(),
            container_id: "COPY-CID".into(),
        };
        blob.chunk_link(&ctx, "http://blob-0/SRC", "http://blob-0/DST", &owner)
            .await
            .unwrap();

        blob.chunk_delete(&ctx, "http://blob-0/SRC", Some("CID")).await.unwrap();
        assert_eq!(&blob.chunk_get(&ctx, "http://blob-0/DST", None).await.unwrap()[..], b"payload");
        let probe = blob.chunk_head(&ctx, "http://blob-0/DST").await.unwrap();
        assert_eq!(probe.full_path, "acct/copy/obj/1");
        assert_eq!(probe.content_id, "COPY");

        // The copy belongs to its new container only.
        let foreign = blob.chunk_delete(&ctx, "http://blob-0/DST", Some("CID")).await;
        assert!(matches!(foreign, Err(OioError::ChunkException(_))));
        blob.chunk_delete(&ctx, "http://blob-0/DST", Some("COPY-CID")).await.unwrap();

        let missing = blob
            .chunk_link(&ctx, "http://blob-0/GONE", "http://blob-0/NEW", &owner)
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }
}
