pub mod account_handlers;
pub mod container_handlers;
pub mod health_handlers;
pub mod object_handlers;

use crate::{
    clients::{blob::LocalBlobClient, cold::LocalColdStorage, sqlite::SqliteMeta},
    config::AppConfig,
    context::RequestContext,
    errors::AppError,
    models::container::NS_MAX_VERSIONS,
    services::{Backends, ObjectStorage},
};
use axum::http::HeaderMap;
use sqlx::SqlitePool;
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

pub const HEADER_REQUEST_ID: &str = "x-oio-req-id";
/// Request budget in seconds.
pub const HEADER_TIMEOUT: &str = "x-oio-timeout";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: ObjectStorage,
    pub db: Arc<SqlitePool>,
    pub blob_root: PathBuf,
}

impl AppState {
    /// Wire the local backends together.
    pub async fn from_config(cfg: &AppConfig, db: Arc<SqlitePool>) -> anyhow::Result<Self> {
        let blob = Arc::new(LocalBlobClient::new(&cfg.blob_root));
        let meta = Arc::new(SqliteMeta::new(db.clone(), cfg.placement()?).with_chunk_sink(blob.clone()));
        if let Some(max_versions) = cfg.max_versions {
            meta.set_namespace_config(NS_MAX_VERSIONS, &max_versions.to_string())
                .await?;
        }
        let backends = Backends {
            metadata: meta.clone(),
            directory: meta.clone(),
            account: meta,
            blob,
            cold: Arc::new(LocalColdStorage),
        };
        Ok(Self {
            storage: ObjectStorage::new(backends, cfg.orchestrator()),
            db,
            blob_root: PathBuf::from(&cfg.blob_root),
        })
    }
}

/// Build the request context from the request headers.
pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, AppError> {
    let mut ctx = RequestContext::new();
    if let Some(id) = headers
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx = ctx.with_request_id(id);
    }
    if let Some(raw) = headers.get(HEADER_TIMEOUT) {
        let seconds = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| (0.0..1e9).contains(v))
            .ok_or_else(|| AppError::bad_request(format!("invalid {HEADER_TIMEOUT} header")))?;
        ctx = ctx.with_deadline(Instant::now() + Duration::from_secs_f64(seconds));
    }
    Ok(ctx)
}
