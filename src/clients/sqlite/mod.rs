//! Metadata, account and directory services backed by one SQLite database.
//!
//! Containers, object versions and chunk records live in SQLite; chunk bytes
//! live on blob nodes. When a version is removed, its chunks are handed to
//! an optional chunk sink for deletion, as the metadata service of a real
//! cluster would notify its blob nodes.

mod account;
mod directory;
mod meta;

use super::BlobClient;
use crate::{
    context::RequestContext,
    errors::{OioError, OioResult},
    models::{
        chunk::ChunkDescriptor,
        container::{ContainerInfo, NS_MAX_VERSIONS, SYS_MAX_VERSIONS, container_id},
        object::{ObjectMetadata, Properties},
    },
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use sqlx::{FromRow, SqlitePool};
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

/// Schema of the local backends.
pub const SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

/// Apply the embedded schema. Statements are idempotent.
pub async fn run_migrations(db: &SqlitePool) -> OioResult<usize> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(statements.len())
}

/// Storage policies shipped by default, name to chunk method.
pub fn default_policies() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("SINGLE".to_string(), "plain/nb_copy=1".to_string()),
        ("THREECOPIES".to_string(), "plain/nb_copy=3".to_string()),
        ("EC".to_string(), "ec/algo=xor_parity,k=4,m=1".to_string()),
        (
            "COLD".to_string(),
            "backblaze/account_id=local,bucket_name=archive".to_string(),
        ),
    ])
}

/// Parse `NAME=chunk_method;NAME=chunk_method`.
pub fn parse_policies(raw: &str) -> OioResult<BTreeMap<String, String>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, method)| (name.trim().to_string(), method.trim().to_string()))
                .filter(|(name, method)| !name.is_empty() && !method.is_empty())
                .ok_or_else(|| OioError::ConfigurationException(format!("invalid policy `{entry}`")))
        })
        .collect()
}

/// Where and how big new chunks are.
#[derive(Clone, Debug)]
pub struct PlacementConfig {
    /// Blob services chunks are spread over.
    pub services: Vec<String>,
    pub chunk_size: u64,
    pub policies: BTreeMap<String, String>,
    pub default_policy: String,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            services: (0..5).map(|i| format!("blob-{i}")).collect(),
            chunk_size: 1024 * 1024,
            policies: default_policies(),
            default_policy: "SINGLE".into(),
        }
    }
}

#[derive(Clone)]
pub struct SqliteMeta {
    db: Arc<SqlitePool>,
    placement: PlacementConfig,
    chunk_sink: Option<Arc<dyn BlobClient>>,
}

#[derive(FromRow)]
struct ContainerRow {
    account: String,
    name: String,
    ctime: i64,
    frozen: bool,
    properties: String,
    system: String,
}

impl ContainerRow {
    fn into_info(self) -> OioResult<ContainerInfo> {
        Ok(ContainerInfo {
            account: self.account,
            name: self.name,
            properties: parse_props(&self.properties)?,
            system: parse_props(&self.system)?,
            frozen: self.frozen,
            ctime: self.ctime,
        })
    }
}

#[derive(FromRow)]
struct ContentRow {
    account: String,
    container: String,
    name: String,
    version: i64,
    content_id: String,
    policy: String,
    chunk_method: String,
    length: i64,
    hash: String,
    mime_type: String,
    properties: String,
    deleted: bool,
    ctime: i64,
}

const CONTENT_COLUMNS: &str = "c.account, c.container, c.name, c.version, c.content_id, \
     c.policy, c.chunk_method, c.length, c.hash, c.mime_type, c.properties, c.deleted, c.ctime";

impl ContentRow {
    fn into_meta(self, with_properties: bool) -> OioResult<ObjectMetadata> {
        let properties = if with_properties {
            parse_props(&self.properties)?
        } else {
            Properties::new()
        };
        Ok(ObjectMetadata {
            account: self.account,
            container: self.container,
            name: self.name,
            version: self.version,
            content_id: self.content_id,
            policy: self.policy,
            chunk_method: self.chunk_method,
            length: self.length.max(0) as u64,
            hash: self.hash,
            mime_type: self.mime_type,
            properties,
            deleted: self.deleted,
            ctime: self.ctime,
        })
    }

    /// Listing entry with the field names of the metadata service.
    fn to_listing_entry(&self, with_properties: bool) -> OioResult<serde_json::Value> {
        let mut entry = json!({
            "name": self.name,
            "ver": self.version,
            "content": self.content_id,
            "policy": self.policy,
            "chunk_method": self.chunk_method,
            "size": self.length,
            "hash": self.hash,
            "mime-type": self.mime_type,
            "deleted": self.deleted,
            "ctime": self.ctime,
        });
        if with_properties {
            entry["properties"] = serde_json::to_value(parse_props(&self.properties)?)?;
        }
        Ok(entry)
    }
}

#[derive(FromRow)]
struct ChunkRow {
    url: String,
    pos: String,
    size: i64,
    hash: String,
}

impl ChunkRow {
    fn into_descriptor(self) -> OioResult<ChunkDescriptor> {
        Ok(ChunkDescriptor::new(
            self.url,
            self.pos.parse()?,
            self.size.max(0) as u64,
            self.hash,
        ))
    }
}

impl SqliteMeta {
    pub fn new(db: Arc<SqlitePool>, placement: PlacementConfig) -> Self {
        Self {
            db,
            placement,
            chunk_sink: None,
        }
    }

    /// Blob client used to delete the chunks of removed versions.
    pub fn with_chunk_sink(mut self, sink: Arc<dyn BlobClient>) -> Self {
        self.chunk_sink = Some(sink);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub fn placement(&self) -> &PlacementConfig {
        &self.placement
    }

    pub async fn set_namespace_config(&self, key: &str, value: &str) -> OioResult<()> {
        sqlx::query(
            "INSERT INTO namespace_config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn fetch_container(&self, account: &str, container: &str) -> OioResult<ContainerRow> {
        sqlx::query_as::<_, ContainerRow>(
            "SELECT account, name, ctime, frozen, properties, system
             FROM containers WHERE account = ? AND name = ?",
        )
        .bind(account)
        .bind(container)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| OioError::NoSuchContainer(format!("{account}/{container}")))
    }

    /// The container, provided its contents may change.
    async fn ensure_writable(&self, account: &str, container: &str) -> OioResult<ContainerRow> {
        let row = self.fetch_container(account, container).await?;
        if row.frozen {
            return Err(OioError::Conflict(format!("container {account}/{container} is frozen")));
        }
        Ok(row)
    }

    /// Whether a container keeps more than one version per name.
    async fn is_versioned(&self, row: &ContainerRow) -> OioResult<bool> {
        let system = parse_props(&row.system)?;
        let raw = match system.get(SYS_MAX_VERSIONS) {
            Some(raw) => Some(raw.clone()),
            None => sqlx::query_scalar::<_, String>(
                "SELECT value FROM namespace_config WHERE key = ?",
            )
            .bind(NS_MAX_VERSIONS)
            .fetch_optional(&*self.db)
            .await?,
        };
        Ok(raw
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .is_some_and(|max| max != 1))
    }

    /// Latest version of `name`, deleted marker included.
    async fn latest_row(
        &self,
        account: &str,
        container: &str,
        name: &str,
    ) -> OioResult<Option<ContentRow>> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM contents c
             WHERE c.account = ? AND c.container = ? AND c.name = ?
             ORDER BY c.version DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, ContentRow>(&sql)
            .bind(account)
            .bind(container)
            .bind(name)
            .fetch_optional(&*self.db)
            .await?)
    }

    /// The requested version, or the latest live one. A missing object is
    /// told apart from a missing container.
    async fn fetch_content(
        &self,
        account: &str,
        container: &str,
        name: &str,
        version: Option<i64>,
    ) -> OioResult<ContentRow> {
        let row = match version {
            Some(version) => {
                let sql = format!(
                    "SELECT {CONTENT_COLUMNS} FROM contents c
                     WHERE c.account = ? AND c.container = ? AND c.name = ? AND c.version = ?"
                );
                sqlx::query_as::<_, ContentRow>(&sql)
                    .bind(account)
                    .bind(container)
                    .bind(name)
                    .bind(version)
                    .fetch_optional(&*self.db)
                    .await?
            }
            None => self
                .latest_row(account, container, name)
                .await?
                .filter(|row| !row.deleted),
        };
        match row {
            Some(row) => Ok(row),
            None => {
                self.fetch_container(account, container).await?;
                Err(OioError::NoSuchObject(format!("{account}/{container}/{name}")))
            }
        }
    }

    async fn fetch_chunks(
        &self,
        account: &str,
        container: &str,
        name: &str,
        version: i64,
    ) -> OioResult<Vec<ChunkDescriptor>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT url, pos, size, hash FROM chunks
             WHERE account = ? AND container = ? AND name = ? AND version = ?",
        )
        .bind(account)
        .bind(container)
        .bind(name)
        .bind(version)
        .fetch_all(&*self.db)
        .await?;
        let mut chunks = rows
            .into_iter()
            .map(ChunkRow::into_descriptor)
            .collect::<OioResult<Vec<_>>>()?;
        chunks.sort_by_key(|chunk| chunk.pos);
        Ok(chunks)
    }

    /// Report a container's counters to its account.
    async fn push_stats(&self, account: &str, container: &str) -> OioResult<()> {
        let (objects, bytes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(length), 0) FROM contents
             WHERE account = ? AND container = ? AND deleted = 0",
        )
        .bind(account)
        .bind(container)
        .fetch_one(&*self.db)
        .await?;
        sqlx::query(
            "INSERT INTO container_stats (account, name, objects, bytes, mtime, dtime)
             VALUES (?, ?, ?, ?, ?, 0)
             ON CONFLICT(account, name) DO UPDATE SET
                objects = excluded.objects,
                bytes = excluded.bytes,
                mtime = excluded.mtime,
                dtime = 0",
        )
        .bind(account)
        .bind(container)
        .bind(objects)
        .bind(bytes)
        .bind(now_secs())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Best-effort removal of the chunks of removed versions. Only chunks
    /// owned by `account/container` are removed.
    async fn discard_chunks(
        &self,
        ctx: &RequestContext,
        account: &str,
        container: &str,
        urls: Vec<String>,
    ) {
        let Some(sink) = &self.chunk_sink else {
            return;
        };
        let ctx = ctx.without_deadline();
        let cid = container_id(account, container);
        let deletes = urls.iter().map(|url| {
            let (ctx, cid) = (&ctx, cid.as_str());
            async move {
                if let Err(err) = sink.chunk_delete(ctx, url, Some(cid)).await {
                    debug!(url = %url, error = %err, "chunk of removed version not deleted");
                }
            }
        });
        join_all(deletes).await;
    }
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn now_secs() -> f64 {
    now_micros() as f64 / 1_000_000.0
}

fn parse_props(raw: &str) -> OioResult<Properties> {
    if raw.is_empty() {
        return Ok(Properties::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn props_json(props: &Properties) -> OioResult<String> {
    Ok(serde_json::to_string(props)?)
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Group `name` under `prefix + ... + delimiter` when listing with a
/// delimiter. Returns `None` when the name is not grouped.
fn compute_common_prefix(name: &str, requested_prefix: Option<&str>, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let prefix = requested_prefix.unwrap_or("");
    let after_prefix = name.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!("{prefix}{}", &after_prefix[..pos + delimiter.len()]))
}
