//! The public surface of the orchestrator.
//!
//! `ObjectStorage` owns handles to every collaborator. Orchestrated
//! operations (upload, fetch, snapshot, purge, refresh, listing) live in
//! their own modules as further `impl ObjectStorage` blocks; this module
//! holds construction, the plain pass-through CRUD calls, `object_locate`
//! and `object_head`.

use super::{
    erasure::{ErasureCodec, XorParityCodec},
    reaper::ChunkReaper,
};
use crate::{
    clients::{AccountClient, BlobClient, ColdStorage, DirectoryClient, MetadataClient},
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        chunk::ChunkDescriptor,
        container::{AccountInfo, ContainerInfo},
        listing::{ContainerEntry, ContainerListParams},
        object::{ObjectMetadata, Properties},
    },
};
use futures::{StreamExt, stream};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, warn};

pub const DEFAULT_KEY_FILE: &str = "/etc/oio/sds/b2-appkey.conf";

/// Tunables of the orchestration layer.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub namespace: String,
    /// Parallel deletes issued by the orphan reaper.
    pub reaper_concurrency: usize,
    /// Parallel hard links and chunk probes.
    pub link_concurrency: usize,
    /// Staged chunk records flushed per raw update during a snapshot.
    pub snapshot_batch: usize,
    /// Trailing characters of a chunk url replaced when copying it.
    pub random_hex: usize,
    /// Credentials file of the cold-storage provider.
    pub key_file: PathBuf,
    pub refresh_attempts: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            namespace: "OPENIO".into(),
            reaper_concurrency: 10,
            link_concurrency: 10,
            snapshot_batch: 100,
            random_hex: 64,
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            refresh_attempts: 3,
        }
    }
}

/// The collaborators an `ObjectStorage` drives.
#[derive(Clone)]
pub struct Backends {
    pub metadata: Arc<dyn MetadataClient>,
    pub directory: Arc<dyn DirectoryClient>,
    pub account: Arc<dyn AccountClient>,
    pub blob: Arc<dyn BlobClient>,
    pub cold: Arc<dyn ColdStorage>,
}

/// How hard `object_head` looks before answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustLevel {
    /// The metadata record exists.
    Metadata,
    /// Enough chunks exist to read the object back.
    Readable,
    /// Every chunk exists.
    AllChunks,
}

impl TrustLevel {
    pub fn from_level(level: u8) -> OioResult<Self> {
        match level {
            0 => Ok(TrustLevel::Metadata),
            1 => Ok(TrustLevel::Readable),
            2 => Ok(TrustLevel::AllChunks),
            other => Err(OioError::InvalidArgument(format!(
                "trust level must be between 0 and 2, got {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LocateOptions {
    /// Return object properties with the description.
    pub properties: bool,
    /// Probe every chunk on its blob node.
    pub chunk_info: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            properties: true,
            chunk_info: false,
        }
    }
}

#[derive(Clone)]
pub struct ObjectStorage {
    pub(crate) metadata: Arc<dyn MetadataClient>,
    pub(crate) directory: Arc<dyn DirectoryClient>,
    pub(crate) account: Arc<dyn AccountClient>,
    pub(crate) blob: Arc<dyn BlobClient>,
    pub(crate) cold: Arc<dyn ColdStorage>,
    pub(crate) codec: Arc<dyn ErasureCodec>,
    pub(crate) config: OrchestratorConfig,
}

impl ObjectStorage {
    pub fn new(backends: Backends, config: OrchestratorConfig) -> Self {
        Self {
            metadata: backends.metadata,
            directory: backends.directory,
            account: backends.account,
            blob: backends.blob,
            cold: backends.cold,
            codec: Arc::new(XorParityCodec),
            config,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ErasureCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn reaper(&self) -> ChunkReaper {
        ChunkReaper::new(self.blob.clone(), self.config.reaper_concurrency)
    }

    // Accounts

    pub async fn account_create(&self, ctx: &RequestContext, account: &str) -> OioResult<bool> {
        self.account.account_create(ctx, account).await
    }

    pub async fn account_delete(&self, ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.account.account_delete(ctx, account).await
    }

    pub async fn account_show(&self, ctx: &RequestContext, account: &str) -> OioResult<AccountInfo> {
        self.account.account_show(ctx, account).await
    }

    pub async fn account_list(&self, ctx: &RequestContext) -> OioResult<Vec<String>> {
        self.account.account_list(ctx).await
    }

    pub async fn account_set_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        properties: &Properties,
    ) -> OioResult<()> {
        self.account
            .account_update(ctx, account, Some(properties), None)
            .await
    }

    pub async fn account_del_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        keys: &[String],
    ) -> OioResult<()> {
        self.account.account_update(ctx, account, None, Some(keys)).await
    }

    pub async fn account_flush(&self, ctx: &RequestContext, account: &str) -> OioResult<()> {
        self.account.account_flush(ctx, account).await
    }

    // Containers

    /// Returns `false` when the container already existed.
    pub async fn container_create(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
    ) -> OioResult<bool> {
        self.metadata
            .container_create(ctx, account, container, properties)
            .await
    }

    /// Create several containers; each name is reported with whether it was
    /// created. A failure on one name does not stop the others.
    pub async fn container_create_many(
        &self,
        ctx: &RequestContext,
        account: &str,
        containers: &[String],
        properties: &Properties,
    ) -> OioResult<Vec<(String, bool)>> {
        let mut results = Vec::with_capacity(containers.len());
        for container in containers {
            let created = match self
                .metadata
                .container_create(ctx, account, container, properties)
                .await
            {
                Ok(created) => created,
                Err(err) => {
                    warn!(account, container = %container, error = %err, "container creation failed");
                    false
                }
            };
            results.push((container.clone(), created));
        }
        Ok(results)
    }

    pub async fn container_delete(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.metadata.container_delete(ctx, account, container).await
    }

    pub async fn container_list(
        &self,
        ctx: &RequestContext,
        account: &str,
        params: &ContainerListParams,
    ) -> OioResult<Vec<ContainerEntry>> {
        self.account.container_list(ctx, account, params).await
    }

    pub async fn container_show(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<ContainerInfo> {
        self.metadata.container_show(ctx, account, container).await
    }

    /// User and system properties of a container.
    pub async fn container_get_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<(Properties, Properties)> {
        let info = self.metadata.container_show(ctx, account, container).await?;
        Ok((info.properties, info.system))
    }

    pub async fn container_set_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
        system: &Properties,
        clear: bool,
    ) -> OioResult<()> {
        self.metadata
            .container_set_properties(ctx, account, container, properties, system, clear)
            .await
    }

    pub async fn container_del_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        keys: &[String],
    ) -> OioResult<()> {
        self.metadata
            .container_del_properties(ctx, account, container, keys)
            .await
    }

    pub async fn container_touch(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<()> {
        self.metadata.container_touch(ctx, account, container).await
    }

    // Objects

    pub async fn object_delete(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        self.metadata
            .content_delete(ctx, account, container, name, version)
            .await
    }

    pub async fn object_delete_many(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        names: &[String],
    ) -> OioResult<Vec<(String, bool)>> {
        self.metadata
            .content_delete_many(ctx, account, container, names)
            .await
    }

    pub async fn object_get_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<ObjectMetadata> {
        self.metadata
            .content_get_properties(ctx, account, container, name, version)
            .await
    }

    pub async fn object_set_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: &Properties,
    ) -> OioResult<()> {
        self.metadata
            .content_set_properties(ctx, account, container, name, version, properties)
            .await
    }

    pub async fn object_del_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        keys: &[String],
    ) -> OioResult<bool> {
        self.metadata
            .content_del_properties(ctx, account, container, name, version, keys)
            .await
    }

    pub async fn object_touch(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        self.metadata
            .content_touch(ctx, account, container, name, version)
            .await
    }

    /// Drop the chunks of an object but keep its metadata. The forgotten
    /// chunks are removed from their blob nodes.
    pub async fn object_drain(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        let chunks = self
            .metadata
            .content_drain(ctx, account, container, name, version)
            .await?;
        self.reaper().reap(ctx, &chunks, None).await;
        Ok(())
    }

    /// Object description and its chunks, sorted by position. With
    /// `chunk_info`, each chunk is probed on its blob node; a failed probe is
    /// recorded in the chunk's `error` instead of failing the call.
    pub async fn object_locate(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        options: LocateOptions,
    ) -> OioResult<(ObjectMetadata, Vec<ChunkDescriptor>)> {
        let (meta, mut chunks) = self
            .metadata
            .content_locate(ctx, account, container, name, version, options.properties)
            .await?;
        chunks.sort_by_key(|chunk| chunk.pos);
        if !options.chunk_info {
            return Ok((meta, chunks));
        }

        let probes: Vec<_> = chunks
            .into_iter()
            .map(|mut chunk| {
                let blob = self.blob.clone();
                let ctx = ctx.clone();
                async move {
                    match blob.chunk_head(&ctx, &chunk.url).await {
                        Ok(probe) => chunk.probe = Some(probe),
                        Err(err) => {
                            debug!(url = %chunk.url, error = %err, "chunk probe failed");
                            chunk.error = Some(err.to_string());
                        }
                    }
                    chunk
                }
            })
            .collect();
        let probed = stream::iter(probes)
            .buffered(self.config.link_concurrency.max(1))
            .collect()
            .await;
        Ok((meta, probed))
    }

    /// Whether the object exists, checked as deeply as `trust` asks.
    pub async fn object_head(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        trust: TrustLevel,
    ) -> OioResult<bool> {
        let checked = match trust {
            TrustLevel::Metadata => self
                .metadata
                .content_get_properties(ctx, account, container, name, version)
                .await
                .map(|_| ()),
            TrustLevel::Readable => {
                return Err(OioError::Unsupported(
                    "readability check of an object".into(),
                ));
            }
            TrustLevel::AllChunks => self.head_all_chunks(ctx, account, container, name, version).await,
        };
        match checked {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn head_all_chunks(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()> {
        let (_, chunks) = self
            .metadata
            .content_locate(ctx, account, container, name, version, false)
            .await?;
        for chunk in &chunks {
            self.blob.chunk_head(ctx, &chunk.url).await?;
        }
        Ok(())
    }
}
