//! Object creation: prepare, stream, verify, commit, and roll back the
//! chunks of any attempt that does not end with committed metadata.

use super::{
    object_storage::ObjectStorage,
    placement::MetachunkPreparer,
    storage_method::StorageMethod,
    write::{
        ChunkTarget, ObjectSource, SourceReader, WriteHandler, cold::ColdWriteHandler,
        ec::EcWriteHandler, replicated::ReplicatedWriteHandler,
    },
};
use crate::{
    clients::{ColdCredentials, ContentCreate, cold::KeyFileCredentials},
    context::{RequestContext, STAGE_RAWX},
    errors::{OioError, OioResult},
    models::{
        chunk::ChunkDescriptor,
        container::container_id,
        object::{DEFAULT_MIME_TYPE, ObjectMetadata, Properties},
    },
};
use chrono::Utc;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{info, warn};

/// Parameters of `object_create`.
#[derive(Debug)]
pub struct ObjectCreate {
    pub account: String,
    pub container: String,
    /// Defaults to the file name of a path source.
    pub name: Option<String>,
    pub source: Option<ObjectSource>,
    /// Expected MD5, compared case-insensitively.
    pub etag: Option<String>,
    pub mime_type: Option<String>,
    pub properties: Properties,
    pub policy: Option<String>,
    /// Overrides the configured cold-storage key file.
    pub key_file: Option<PathBuf>,
    pub append: bool,
}

impl ObjectCreate {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<ObjectSource>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            name: Some(name.into()),
            source: Some(source.into()),
            etag: None,
            mime_type: None,
            properties: Properties::new(),
            policy: None,
            key_file: None,
            append: false,
        }
    }

    /// Upload a local file, named after its base name.
    pub fn from_path(
        account: impl Into<String>,
        container: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: None,
            ..Self::new(account, container, "", ObjectSource::Path(path.as_ref().to_path_buf()))
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    pub fn appending(mut self) -> Self {
        self.append = true;
        self
    }
}

/// A committed upload.
#[derive(Clone, Debug)]
pub struct CreatedObject {
    pub meta: ObjectMetadata,
    pub chunks: Vec<ChunkDescriptor>,
    /// Bytes written by this call.
    pub size: u64,
    /// Upper-case MD5 of the bytes written by this call.
    pub hash: String,
}

fn resolve_name(name: Option<String>, source: &ObjectSource) -> OioResult<String> {
    match (name, source) {
        (Some(name), _) if !name.is_empty() => Ok(name),
        (_, ObjectSource::Path(path)) => path
            .file_name()
            .map(|base| base.to_string_lossy().into_owned())
            .ok_or(OioError::MissingName),
        _ => Err(OioError::MissingName),
    }
}

impl ObjectStorage {
    pub async fn object_create(
        &self,
        ctx: &RequestContext,
        request: ObjectCreate,
    ) -> OioResult<CreatedObject> {
        let ObjectCreate {
            account,
            container,
            name,
            source,
            etag,
            mime_type,
            properties,
            policy,
            key_file,
            append,
        } = request;

        let source = source.ok_or(OioError::MissingData)?;
        let name = resolve_name(name, &source)?;
        let mut reader = SourceReader::open(source).await?;

        let mut preparer = MetachunkPreparer::prepare(
            self.directory.clone(),
            ctx,
            &account,
            &container,
            &name,
            policy.as_deref(),
            append,
        )
        .await?;
        let prepared = preparer.meta.clone();
        let mut meta = ObjectMetadata {
            account,
            container,
            name,
            version: prepared.version,
            content_id: prepared.content_id,
            policy: prepared.policy,
            chunk_method: prepared.chunk_method,
            mime_type: mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            properties,
            ctime: Utc::now().timestamp(),
            ..ObjectMetadata::default()
        };

        let method = StorageMethod::load(&meta.chunk_method)?;
        let cid = container_id(&meta.account, &meta.container);
        let target = ChunkTarget {
            full_path: meta.full_path(),
            content_id: meta.content_id.clone(),
            container_id: cid.clone(),
        };
        let mut cold_creds = None;
        let handler = match &method {
            StorageMethod::Replicated { .. } => WriteHandler::Replicated(
                ReplicatedWriteHandler::new(self.blob.clone(), target, method.write_quorum()),
            ),
            StorageMethod::Ec(params) => WriteHandler::Ec(EcWriteHandler::new(
                self.blob.clone(),
                target,
                params.clone(),
                self.codec.clone(),
            )),
            StorageMethod::Cold(params) => {
                let key_file = key_file.unwrap_or_else(|| self.config.key_file.clone());
                let creds =
                    KeyFileCredentials::load(&key_file, &params.account_id, &params.bucket_name)
                        .await?;
                cold_creds = Some(creds.clone());
                WriteHandler::Cold(ColdWriteHandler::new(self.cold.clone(), creds))
            }
        };

        let started = Instant::now();
        let streamed = handler.stream(ctx, &mut reader, &mut preparer).await;
        ctx.add_perf(STAGE_RAWX, started.elapsed());
        let outcome = match streamed {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    request_id = %ctx.request_id,
                    object = %meta.full_path(),
                    error = %err,
                    "upload failed, removing chunks written so far"
                );
                self.reap_upload(ctx, &preparer.all_chunks_so_far(), &cid, cold_creds.as_ref())
                    .await;
                return Err(err);
            }
        };

        if let Some(etag) = etag.filter(|etag| !etag.eq_ignore_ascii_case(&outcome.checksum)) {
            warn!(
                request_id = %ctx.request_id,
                object = %meta.full_path(),
                given = %etag,
                computed = %outcome.checksum,
                "checksum mismatch, removing uploaded chunks"
            );
            self.reap_upload(ctx, &outcome.chunks, &cid, cold_creds.as_ref())
                .await;
            return Err(OioError::EtagMismatch {
                given: etag,
                computed: outcome.checksum,
            });
        }

        let commit = ContentCreate {
            account: meta.account.clone(),
            container: meta.container.clone(),
            name: meta.name.clone(),
            version: meta.version,
            content_id: meta.content_id.clone(),
            size: outcome.bytes,
            checksum: outcome.checksum.clone(),
            policy: meta.policy.clone(),
            chunk_method: meta.chunk_method.clone(),
            mime_type: meta.mime_type.clone(),
            chunks: outcome.chunks.clone(),
            properties: meta.properties.clone(),
            append,
        };
        if let Err(err) = self.metadata.content_create(ctx, &commit).await {
            if err.triggers_rollback() {
                warn!(
                    request_id = %ctx.request_id,
                    object = %meta.full_path(),
                    error = %err,
                    "commit failed, removing uploaded chunks"
                );
                self.reap_upload(ctx, &outcome.chunks, &cid, cold_creds.as_ref())
                    .await;
            }
            return Err(err);
        }

        meta.length = prepared.first_offset + outcome.bytes;
        meta.hash = outcome.checksum.clone();
        info!(
            request_id = %ctx.request_id,
            object = %meta.full_path(),
            size = outcome.bytes,
            chunks = outcome.chunks.len(),
            "object created"
        );
        Ok(CreatedObject {
            meta,
            chunks: outcome.chunks,
            size: outcome.bytes,
            hash: outcome.checksum,
        })
    }

    async fn reap_upload(
        &self,
        ctx: &RequestContext,
        chunks: &[ChunkDescriptor],
        cid: &str,
        cold: Option<&ColdCredentials>,
    ) {
        let reaper = self.reaper();
        match cold {
            Some(creds) => reaper.reap_cold(ctx, self.cold.clone(), creds, chunks).await,
            None => reaper.reap(ctx, chunks, Some(cid)).await,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn name_defaults_to_file_base_name() {
        let source = ObjectSource::Path(PathBuf::from("/tmp/dir/report.pdf"));
        assert_eq!(resolve_name(None, &source).unwrap(), "report.pdf");
        assert_eq!(
            resolve_name(Some("explicit".into()), &source).unwrap(),
            "explicit"
        );
    }

    #[test]
    fn name_is_required_for_inline_data() {
        let source = ObjectSource::Bytes(Bytes::from_static(b"x"));
        assert!(matches!(resolve_name(None, &source), Err(OioError::MissingName)));
        assert!(matches!(
            resolve_name(Some(String::new()), &source),
            Err(OioError::MissingName)
        ));
    }
}
