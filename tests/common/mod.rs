#![allow(dead_code)]

use futures::TryStreamExt;
use serde_json::json;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use storage_orchestrator::{
    OioResult, ObjectStorage, RequestContext,
    clients::{
        blob::LocalBlobClient,
        cold::LocalColdStorage,
        sqlite::{PlacementConfig, SqliteMeta, run_migrations},
    },
    models::{container::SYS_MAX_VERSIONS, object::Properties},
    services::{Backends, ByteStream, ObjectCreate, OrchestratorConfig},
};
use tempfile::TempDir;

/// Small metachunks so that a few hundred bytes span several of them.
pub const CHUNK_SIZE: u64 = 64;

pub struct Harness {
    pub storage: ObjectStorage,
    pub db: Arc<SqlitePool>,
    pub meta: Arc<SqliteMeta>,
    pub blob: Arc<LocalBlobClient>,
    pub key_file: PathBuf,
    pub ctx: RequestContext,
    _tmp: TempDir,
}

pub async fn harness() -> Harness {
    harness_with(OrchestratorConfig::default()).await
}

pub async fn harness_with(config: OrchestratorConfig) -> Harness {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");

    let placement = PlacementConfig {
        chunk_size: CHUNK_SIZE,
        ..PlacementConfig::default()
    };
    let blob = Arc::new(LocalBlobClient::new(tmp.path().join("blob")));
    let db = Arc::new(pool);
    let meta = Arc::new(SqliteMeta::new(db.clone(), placement).with_chunk_sink(blob.clone()));

    let key_file = tmp.path().join("keys.json");
    let keys = json!({
        "local.archive": {
            "application_key": "secret",
            "endpoint": tmp.path().join("cold").display().to_string(),
        }
    });
    std::fs::write(&key_file, keys.to_string()).expect("key file");

    let backends = Backends {
        metadata: meta.clone(),
        directory: meta.clone(),
        account: meta.clone(),
        blob: blob.clone(),
        cold: Arc::new(LocalColdStorage),
    };
    let config = OrchestratorConfig {
        key_file: key_file.clone(),
        ..config
    };
    Harness {
        storage: ObjectStorage::new(backends, config),
        db,
        meta,
        blob,
        key_file,
        ctx: RequestContext::new(),
        _tmp: tmp,
    }
}

impl Harness {
    pub async fn put(&self, container: &str, name: &str, data: &[u8], policy: &str) -> OioResult<i64> {
        let request = ObjectCreate::new("acct", container, name, data.to_vec()).with_policy(policy);
        Ok(self.storage.object_create(&self.ctx, request).await?.meta.version)
    }

    pub async fn get(&self, container: &str, name: &str) -> OioResult<Vec<u8>> {
        let (_, stream) = self
            .storage
            .object_fetch(&self.ctx, "acct", container, name, Default::default())
            .await?;
        read_all(stream).await
    }

    /// Keep every version of every object in `container`.
    pub async fn make_versioned(&self, container: &str) {
        self.storage
            .container_create(&self.ctx, "acct", container, &Properties::new())
            .await
            .expect("container");
        let system = Properties::from([(SYS_MAX_VERSIONS.to_string(), "-1".to_string())]);
        self.storage
            .container_set_properties(&self.ctx, "acct", container, &Properties::new(), &system, false)
            .await
            .expect("versioning");
    }

    /// Chunk data files on the blob services.
    pub fn blob_chunks(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_files(self.blob.root(), &mut found);
        found.retain(|path| path.extension().is_none());
        found.sort();
        found
    }

    pub fn cold_root(&self) -> PathBuf {
        self._tmp.path().join("cold")
    }

    pub fn tmp_path(&self) -> &Path {
        self._tmp.path()
    }
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, found);
        } else {
            found.push(path);
        }
    }
}

pub async fn read_all(stream: ByteStream) -> OioResult<Vec<u8>> {
    let parts: Vec<_> = stream.try_collect().await?;
    Ok(parts.concat())
}

/// Deterministic, non-repeating-looking payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + 3) % 251) as u8).collect()
}
