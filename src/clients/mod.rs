//! Collaborator seams: the metadata, directory, blob, account and cold
//! storage services the orchestrators drive.
//!
//! Implementations live in submodules (`sqlite`, `blob`, `cold`) and can be
//! swapped for network clients without touching the orchestration code.

pub mod blob;
pub mod cold;
pub mod sqlite;

use crate::{
    context::RequestContext,
    errors::OioResult,
    models::{
        chunk::{ChunkBean, ChunkDescriptor, ChunkPosition, ChunkProbe, ChunkSlot},
        container::{AccountInfo, ContainerInfo},
        listing::{ContainerEntry, ContainerListParams, ListParams, RawListing},
        object::{ObjectMetadata, Properties},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Everything needed to commit a new object version.
#[derive(Clone, Debug)]
pub struct ContentCreate {
    pub account: String,
    pub container: String,
    pub name: String,
    pub version: i64,
    pub content_id: String,
    pub size: u64,
    pub checksum: String,
    pub policy: String,
    pub chunk_method: String,
    pub mime_type: String,
    pub chunks: Vec<ChunkDescriptor>,
    pub properties: Properties,
    /// Add the chunks to the existing version instead of creating one.
    pub append: bool,
}

#[derive(Clone, Debug)]
pub struct PrepareRequest {
    pub account: String,
    pub container: String,
    pub name: String,
    pub policy: Option<String>,
    /// Metachunk index the slots are requested for.
    pub position: u32,
    pub append: bool,
}

/// Object identity assigned by the directory before any byte is written.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedMeta {
    pub version: i64,
    pub content_id: String,
    pub policy: String,
    pub chunk_method: String,
    /// Maximum metachunk size.
    pub chunk_size: u64,
    /// First metachunk index to write; non-zero when appending.
    pub first_position: u32,
    /// Object offset of `first_position`.
    pub first_offset: u64,
}

#[derive(Clone, Debug)]
pub struct PreparedContent {
    pub meta: PreparedMeta,
    pub chunks: Vec<ChunkSlot>,
}

/// Attributes stored alongside a chunk on its blob node.
#[derive(Clone, Debug)]
pub struct ChunkWriteMeta {
    pub full_path: String,
    pub content_id: String,
    pub container_id: String,
    pub pos: ChunkPosition,
    pub metachunk_size: u64,
}

/// Object a linked chunk copy belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkOwner {
    pub full_path: String,
    pub content_id: String,
    pub container_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkWritten {
    pub size: u64,
    pub hash: String,
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn container_create(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
    ) -> OioResult<bool>;
    async fn container_delete(&self, ctx: &RequestContext, account: &str, container: &str)
    -> OioResult<()>;
    async fn container_show(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
    ) -> OioResult<ContainerInfo>;
    async fn container_set_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        properties: &Properties,
        system: &Properties,
        clear: bool,
    ) -> OioResult<()>;
    async fn container_del_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        keys: &[String],
    ) -> OioResult<()>;
    async fn container_touch(&self, ctx: &RequestContext, account: &str, container: &str)
    -> OioResult<()>;
    async fn container_freeze(&self, ctx: &RequestContext, account: &str, container: &str)
    -> OioResult<()>;
    async fn container_enable(&self, ctx: &RequestContext, account: &str, container: &str)
    -> OioResult<()>;
    /// Materialize a shallow copy of the container's records at the
    /// destination. Chunk records still point at the source chunks.
    async fn container_snapshot(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        dst_account: &str,
        dst_container: &str,
    ) -> OioResult<()>;
    /// Replace each `targets[i]` chunk record with `copies[i]`.
    async fn container_raw_update(
        &self,
        ctx: &RequestContext,
        targets: &[ChunkBean],
        copies: &[ChunkBean],
        account: &str,
        container: &str,
        frozen: bool,
    ) -> OioResult<()>;

    async fn content_list(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        params: &ListParams,
    ) -> OioResult<RawListing>;
    async fn content_locate(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: bool,
    ) -> OioResult<(ObjectMetadata, Vec<ChunkDescriptor>)>;
    async fn content_create(&self, ctx: &RequestContext, request: &ContentCreate) -> OioResult<()>;
    /// Without a version, a deleted marker is added; with one, that version
    /// is removed.
    async fn content_delete(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()>;
    async fn content_delete_many(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        names: &[String],
    ) -> OioResult<Vec<(String, bool)>>;
    async fn content_get_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<ObjectMetadata>;
    async fn content_set_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        properties: &Properties,
    ) -> OioResult<()>;
    async fn content_del_properties(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
        keys: &[String],
    ) -> OioResult<bool>;
    async fn content_touch(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<()>;
    /// Forget the chunks of a content but keep its metadata.
    async fn content_drain(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<Vec<ChunkDescriptor>>;

    async fn namespace_config(&self, ctx: &RequestContext) -> OioResult<BTreeMap<String, String>>;
}

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn content_prepare(
        &self,
        ctx: &RequestContext,
        request: &PrepareRequest,
    ) -> OioResult<PreparedContent>;
}

#[async_trait]
pub trait BlobClient: Send + Sync {
    async fn chunk_put(
        &self,
        ctx: &RequestContext,
        url: &str,
        data: Bytes,
        meta: &ChunkWriteMeta,
    ) -> OioResult<ChunkWritten>;
    /// Read a chunk, or the inclusive byte range `(start, end)` of it.
    async fn chunk_get(
        &self,
        ctx: &RequestContext,
        url: &str,
        range: Option<(u64, u64)>,
    ) -> OioResult<Bytes>;
    async fn chunk_head(&self, ctx: &RequestContext, url: &str) -> OioResult<ChunkProbe>;
    /// Hard-link `target` as `copy`, owned by `owner`.
    async fn chunk_link(
        &self,
        ctx: &RequestContext,
        target: &str,
        copy: &str,
        owner: &ChunkOwner,
    ) -> OioResult<()>;
    /// A missing chunk is reported as `NotFound`.
    async fn chunk_delete(
        &self,
        ctx: &RequestContext,
        url: &str,
        container_id: Option<&str>,
    ) -> OioResult<()>;
}

#[async_trait]
pub trait AccountClient: Send + Sync {
    async fn account_create(&self, ctx: &RequestContext, account: &str) -> OioResult<bool>;
    async fn account_delete(&self, ctx: &RequestContext, account: &str) -> OioResult<()>;
    async fn account_show(&self, ctx: &RequestContext, account: &str) -> OioResult<AccountInfo>;
    async fn account_list(&self, ctx: &RequestContext) -> OioResult<Vec<String>>;
    async fn account_update(
        &self,
        ctx: &RequestContext,
        account: &str,
        properties: Option<&Properties>,
        to_delete: Option<&[String]>,
    ) -> OioResult<()>;
    async fn container_list(
        &self,
        ctx: &RequestContext,
        account: &str,
        params: &ContainerListParams,
    ) -> OioResult<Vec<ContainerEntry>>;
    /// Recompute a container's counters from scratch.
    async fn container_reset(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        mtime: f64,
    ) -> OioResult<()>;
    /// Record that a container disappeared at `dtime`.
    async fn container_update(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        dtime: f64,
    ) -> OioResult<()>;
    async fn account_refresh(&self, ctx: &RequestContext, account: &str) -> OioResult<()>;
    async fn account_flush(&self, ctx: &RequestContext, account: &str) -> OioResult<()>;
}

/// Resolved credentials of a cold-storage bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct ColdCredentials {
    pub account_id: String,
    pub bucket_name: String,
    pub application_key: String,
    pub endpoint: String,
}

#[async_trait]
pub trait ColdStorage: Send + Sync {
    async fn upload(
        &self,
        ctx: &RequestContext,
        creds: &ColdCredentials,
        name: &str,
        data: Bytes,
    ) -> OioResult<String>;
    /// Read `size` bytes at `offset`; an empty result means no data.
    async fn download(
        &self,
        ctx: &RequestContext,
        creds: &ColdCredentials,
        name: &str,
        offset: u64,
        size: u64,
    ) -> OioResult<Bytes>;
    async fn delete(&self, ctx: &RequestContext, creds: &ColdCredentials, name: &str)
    -> OioResult<()>;
}
