use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Every failure the orchestration layer can report.
///
/// Variants are grouped by kind: absence of an entity, concurrent mutation,
/// integrity, deadline, configuration and caller input. Backend plumbing
/// errors (`Io`, `Sqlx`, `Json`) are carried through unchanged.
#[derive(Debug, Error)]
pub enum OioError {
    #[error("account `{0}` not found")]
    NoSuchAccount(String),
    #[error("container `{0}` not found")]
    NoSuchContainer(String),
    #[error("object `{0}` not found")]
    NoSuchObject(String),
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("given etag {given} != computed {computed}")]
    EtagMismatch { given: String, computed: String },
    #[error("corrupted chunk: {0}")]
    CorruptedChunk(String),
    #[error("faulty chunk: {0}")]
    FaultyChunk(String),
    #[error("orphan chunk: {0}")]
    OrphanChunk(String),
    #[error("chunk error: {0}")]
    ChunkException(String),
    #[error("unrecoverable content: {0}")]
    UnrecoverableContent(String),

    #[error("deadline reached")]
    DeadlineReached,
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    ConfigurationException(String),
    #[error("invalid storage method `{0}`")]
    InvalidStorageMethod(String),

    #[error("no data to upload")]
    MissingData,
    #[error("no name for the object has been specified")]
    MissingName,
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("error reading source: {0}")]
    SourceRead(String),
    #[error("range not satisfiable: {0}")]
    UnsatisfiableRange(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Oio(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type OioResult<T> = Result<T, OioError>;

impl OioError {
    /// Absence of a named entity. Call sites iterating many entities treat
    /// this as "skip".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OioError::NoSuchAccount(_)
                | OioError::NoSuchContainer(_)
                | OioError::NoSuchObject(_)
                | OioError::NotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OioError::Conflict(_))
    }

    /// Commit failures after which the written chunks will never be
    /// referenced and must be reaped.
    pub fn triggers_rollback(&self) -> bool {
        matches!(self, OioError::Conflict(_) | OioError::DeadlineReached)
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<OioError> for AppError {
    fn from(err: OioError) -> Self {
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            OioError::FileNotFound(_) => StatusCode::NOT_FOUND,
            OioError::Conflict(_) => StatusCode::CONFLICT,
            OioError::EtagMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OioError::MissingData
            | OioError::MissingName
            | OioError::InvalidArgument(_)
            | OioError::InvalidStorageMethod(_) => StatusCode::BAD_REQUEST,
            OioError::UnsatisfiableRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            OioError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            OioError::DeadlineReached | OioError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_only_on_conflict_and_deadline() {
        assert!(OioError::Conflict("x".into()).triggers_rollback());
        assert!(OioError::DeadlineReached.triggers_rollback());
        assert!(!OioError::Timeout("read".into()).triggers_rollback());
        assert!(!OioError::NoSuchObject("o".into()).triggers_rollback());
    }

    #[test]
    fn http_status_follows_error_kind() {
        let err: AppError = OioError::NoSuchContainer("c".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err: AppError = OioError::EtagMismatch {
            given: "a".into(),
            computed: "b".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let err: AppError = OioError::Unsupported("trust level 1".into()).into();
        assert_eq!(err.status, StatusCode::NOT_IMPLEMENTED);
    }
}
