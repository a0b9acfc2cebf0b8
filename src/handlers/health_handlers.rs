//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> metadata database and blob root checks

use super::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(error) => Self {
                ok: false,
                error: Some(error),
            },
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when the metadata database answers and the blob root accepts a
/// write/read/delete round trip, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("metadata", CheckStatus::from(check_database(&state.db).await));
    checks.insert("blob_root", CheckStatus::from(check_disk(&state.blob_root).await));

    let ready = checks.values().all(|check| check.ok);
    let (status, label) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "error")
    };
    (
        status,
        Json(ReadyResponse {
            status: label,
            checks,
        }),
    )
}

async fn check_database(db: &SqlitePool) -> Result<(), String> {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => Ok(()),
        Ok(other) => Err(format!("unexpected result: {other}")),
        Err(err) => Err(format!("error: {err}")),
    }
}

async fn check_disk(root: &Path) -> Result<(), String> {
    let probe = root.join(format!(".readyz-{}", Uuid::new_v4()));
    let outcome = match fs::write(&probe, b"readyz").await {
        Ok(()) => match fs::read(&probe).await {
            Ok(bytes) if bytes == b"readyz" => Ok(()),
            Ok(_) => Err("probe content mismatch".to_string()),
            Err(err) => Err(format!("could not read probe: {err}")),
        },
        Err(err) => return Err(format!("could not write probe: {err}")),
    };
    // best-effort cleanup
    let _ = fs::remove_file(&probe).await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_check_reports_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(check_disk(tmp.path()).await.is_ok());
        assert!(check_disk(&tmp.path().join("absent")).await.is_err());
    }
}
