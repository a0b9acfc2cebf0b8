//! Cold storage on the local filesystem, and the key file holding the
//! provider credentials.
//!
//! The key file is a JSON object keyed by `"<account_id>.<bucket_name>"`:
//!
//! ```json
//! { "0123abcd.archive": { "application_key": "K00...", "endpoint": "/srv/cold" } }
//! ```

use super::{ColdCredentials, ColdStorage};
use crate::{
    context::RequestContext,
    errors::{OioError, OioResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncReadExt, io::AsyncSeekExt};
use tracing::debug;

#[derive(Deserialize)]
struct KeyEntry {
    application_key: String,
    endpoint: String,
}

pub struct KeyFileCredentials;

impl KeyFileCredentials {
    pub async fn load(path: &Path, account_id: &str, bucket_name: &str) -> OioResult<ColdCredentials> {
        let raw = fs::read(path).await.map_err(|err| {
            OioError::ConfigurationException(format!(
                "cannot read key file {}: {err}",
                path.display()
            ))
        })?;
        let entries: HashMap<String, KeyEntry> = serde_json::from_slice(&raw).map_err(|err| {
            OioError::ConfigurationException(format!(
                "invalid key file {}: {err}",
                path.display()
            ))
        })?;
        let key = format!("{account_id}.{bucket_name}");
        let entry = entries.get(&key).ok_or_else(|| {
            OioError::ConfigurationException(format!(
                "no credentials for `{key}` in {}",
                path.display()
            ))
        })?;
        Ok(ColdCredentials {
            account_id: account_id.to_string(),
            bucket_name: bucket_name.to_string(),
            application_key: entry.application_key.clone(),
            endpoint: entry.endpoint.clone(),
        })
    }
}

/// Stores each chunk as `<endpoint>/<bucket>/<name>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalColdStorage;

impl LocalColdStorage {
    fn object_path(creds: &ColdCredentials, name: &str) -> OioResult<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(OioError::InvalidArgument(format!("invalid cold object name `{name}`")));
        }
        let root = creds.endpoint.strip_prefix("file://").unwrap_or(&creds.endpoint);
        Ok(Path::new(root).join(&creds.bucket_name).join(name))
    }
}

fn not_found(name: &str) -> impl FnOnce(io::Error) -> OioError + '_ {
    move |err| {
        if err.kind() == io::ErrorKind::NotFound {
            OioError::NotFound(name.to_string())
        } else {
            OioError::Io(err)
        }
    }
}

#[async_trait]
impl ColdStorage for LocalColdStorage {
    async fn upload(
        &self,
        ctx: &RequestContext,
        creds: &ColdCredentials,
        name: &str,
        data: Bytes,
    ) -> OioResult<String> {
        ctx.check_deadline()?;
        let path = Self::object_path(creds, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        debug!(bucket = %creds.bucket_name, name, size = data.len(), "cold object stored");
        Ok(format!("{:X}", md5::compute(&data)))
    }

    async fn download(
        &self,
        ctx: &RequestContext,
        creds: &ColdCredentials,
        name: &str,
        offset: u64,
        size: u64,
    ) -> OioResult<Bytes> {
        ctx.check_deadline()?;
        let path = Self::object_path(creds, name)?;
        let mut file = fs::File::open(&path).await.map_err(not_found(name))?;
        let total = file.metadata().await?.len();
        if offset >= total {
            return Ok(Bytes::new());
        }
        let len = size.min(total - offset) as usize;
        file.seek(io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn delete(&self, ctx: &RequestContext, creds: &ColdCredentials, name: &str) -> OioResult<()> {
        ctx.check_deadline()?;
        let path = Self::object_path(creds, name)?;
        fs::remove_file(&path).await.map_err(not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(endpoint: &Path) -> ColdCredentials {
        ColdCredentials {
            account_id: "acc".into(),
            bucket_name: "bucket".into(),
            application_key: "secret".into(),
            endpoint: endpoint.display().to_string(),
        }
    }

    #[tokio::test]
    async fn key_file_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("keys.json");
        std::fs::write(
            &path,
            r#"{"acc.bucket": {"application_key": "secret", "endpoint": "/srv/cold"}}"#,
        )
        .unwrap();

        let found = KeyFileCredentials::load(&path, "acc", "bucket").await.unwrap();
        assert_eq!(found.application_key, "secret");
        assert_eq!(found.endpoint, "/srv/cold");

        let missing = KeyFileCredentials::load(&path, "acc", "other").await;
        assert!(matches!(missing, Err(OioError::ConfigurationException(_))));
        let no_file = KeyFileCredentials::load(&tmp.path().join("nope"), "acc", "bucket").await;
        assert!(matches!(no_file, Err(OioError::ConfigurationException(_))));
    }

    #[tokio::test]
    async fn ranged_download_and_idempotent_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = creds(tmp.path());
        let ctx = RequestContext::new();
        let cold = LocalColdStorage;

        let hash = cold
            .upload(&ctx, &creds, "CHUNK", Bytes::from_static(b"0123456789"))
            .await
            .unwrap();
        assert_eq!(hash, format!("{:X}", md5::compute(b"0123456789")));

        let part = cold.download(&ctx, &creds, "CHUNK", 3, 4).await.unwrap();
        assert_eq!(&part[..], b"3456");
        let tail = cold.download(&ctx, &creds, "CHUNK", 8, 10).await.unwrap();
        assert_eq!(&tail[..], b"89");
        assert!(cold.download(&ctx, &creds, "CHUNK", 10, 1).await.unwrap().is_empty());

        cold.delete(&ctx, &creds, "CHUNK").await.unwrap();
        assert!(cold.delete(&ctx, &creds, "CHUNK").await.unwrap_err().is_not_found());
    }
}
