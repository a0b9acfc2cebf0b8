//! Best-effort removal of chunks that belong to no committed object.
//!
//! Always called from a path that is already failing, so it never returns
//! an error: missing chunks count as removed and anything else is logged.

use crate::{
    clients::{BlobClient, ColdCredentials, ColdStorage},
    context::RequestContext,
    errors::OioResult,
    models::chunk::{ChunkDescriptor, chunk_id_of},
};
use futures::{StreamExt, stream};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub deleted: usize,
    /// Already gone when the delete was issued.
    pub missing: usize,
    pub failed: usize,
}

impl ReapReport {
    fn record(&mut self, url: &str, result: OioResult<()>) {
        match result {
            Ok(()) => self.deleted += 1,
            Err(err) if err.is_not_found() => self.missing += 1,
            Err(err) => {
                warn!(url, error = %err, "failed to delete orphan chunk");
                self.failed += 1;
            }
        }
    }
}

pub struct ChunkReaper {
    blob: Arc<dyn BlobClient>,
    concurrency: usize,
}

impl ChunkReaper {
    pub fn new(blob: Arc<dyn BlobClient>, concurrency: usize) -> Self {
        Self {
            blob,
            concurrency: concurrency.max(1),
        }
    }

    /// Delete `chunks` from their blob nodes. Runs without the caller's
    /// deadline: a request that timed out still gets its chunks removed.
    pub async fn reap(
        &self,
        ctx: &RequestContext,
        chunks: &[ChunkDescriptor],
        container_id: Option<&str>,
    ) -> ReapReport {
        let ctx = ctx.without_deadline();
        let deletes: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let blob = self.blob.clone();
                let ctx = ctx.clone();
                let url = chunk.url.clone();
                let container_id = container_id.map(str::to_string);
                async move {
                    let result = blob.chunk_delete(&ctx, &url, container_id.as_deref()).await;
                    (url, result)
                }
            })
            .collect();
        let results: Vec<_> = stream::iter(deletes)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ReapReport::default();
        for (url, result) in results {
            report.record(&url, result);
        }
        info!(
            request_id = %ctx.request_id,
            deleted = report.deleted,
            missing = report.missing,
            failed = report.failed,
            "orphan chunks reaped"
        );
        report
    }

    /// Same as [`reap`](Self::reap) for chunks held by a cold-storage provider.
    pub async fn reap_cold(
        &self,
        ctx: &RequestContext,
        cold: Arc<dyn ColdStorage>,
        creds: &ColdCredentials,
        chunks: &[ChunkDescriptor],
    ) -> ReapReport {
        let ctx = ctx.without_deadline();
        let deletes: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let cold = cold.clone();
                let ctx = ctx.clone();
                let creds = creds.clone();
                let url = chunk.url.clone();
                async move {
                    let result = cold.delete(&ctx, &creds, chunk_id_of(&url)).await;
                    (url, result)
                }
            })
            .collect();
        let results: Vec<_> = stream::iter(deletes)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ReapReport::default();
        for (url, result) in results {
            report.record(&url, result);
        }
        info!(
            request_id = %ctx.request_id,
            deleted = report.deleted,
            missing = report.missing,
            failed = report.failed,
            "orphan cold chunks reaped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clients::{ChunkOwner, ChunkWriteMeta, ChunkWritten},
        errors::OioError,
        models::chunk::{ChunkPosition, ChunkProbe},
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Deletes succeed for `ok-*`, are missing for `gone-*` and fail otherwise.
    #[derive(Default)]
    struct ScriptedBlob {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobClient for ScriptedBlob {
        async fn chunk_put(
            &self,
            _ctx: &RequestContext,
            _url: &str,
            _data: Bytes,
            _meta: &ChunkWriteMeta,
        ) -> OioResult<ChunkWritten> {
            Err(OioError::Unsupported("put".into()))
        }

        async fn chunk_get(
            &self,
            _ctx: &RequestContext,
            _url: &str,
            _range: Option<(u64, u64)>,
        ) -> OioResult<Bytes> {
            Err(OioError::Unsupported("get".into()))
        }

        async fn chunk_head(&self, _ctx: &RequestContext, _url: &str) -> OioResult<ChunkProbe> {
            Err(OioError::Unsupported("head".into()))
        }

        async fn chunk_link(
            &self,
            _ctx: &RequestContext,
            _target: &str,
            _copy: &str,
            _owner: &ChunkOwner,
        ) -> OioResult<()> {
            Err(OioError::Unsupported("link".into()))
        }

        async fn chunk_delete(
            &self,
            ctx: &RequestContext,
            url: &str,
            _container_id: Option<&str>,
        ) -> OioResult<()> {
            ctx.check_deadline()?;
            self.calls.lock().unwrap().push(url.to_string());
            match url.split('/').next_back().unwrap_or_default() {
                id if id.starts_with("ok") => Ok(()),
                id if id.starts_with("gone") => Err(OioError::NotFound(url.to_string())),
                _ => Err(OioError::Oio("blob node unreachable".into())),
            }
        }
    }

    fn chunk(id: &str) -> ChunkDescriptor {
        ChunkDescriptor::new(format!("http://blob-0/{id}"), ChunkPosition::meta(0), 1, "")
    }

    #[tokio::test]
    async fn every_chunk_is_attempted_and_failures_are_counted() {
        let blob = Arc::new(ScriptedBlob::default());
        let reaper = ChunkReaper::new(blob.clone(), 2);
        let chunks = vec![chunk("ok-1"), chunk("bad-1"), chunk("gone-1"), chunk("ok-2")];

        let report = reaper.reap(&RequestContext::new(), &chunks, None).await;

        assert_eq!(
            report,
            ReapReport {
                deleted: 2,
                missing: 1,
                failed: 1
            }
        );
        assert_eq!(blob.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn expired_request_still_reaps() {
        let blob = Arc::new(ScriptedBlob::default());
        let ctx = RequestContext::new().with_deadline(std::time::Instant::now());
        let chunks = vec![chunk("ok-1"), chunk("ok-2")];

        let report = ChunkReaper::new(blob.clone(), 4).reap(&ctx, &chunks, None).await;

        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let blob = Arc::new(ScriptedBlob::default());
        let report = ChunkReaper::new(blob.clone(), 0)
            .reap(&RequestContext::new(), &[], Some("CID"))
            .await;
        assert_eq!(report, ReapReport::default());
        assert!(blob.calls.lock().unwrap().is_empty());
    }
}
