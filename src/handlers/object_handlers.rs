//! HTTP handlers for object operations under `/v1/{account}/{container}/{*object}`.
//! Bodies are streamed in both directions; nothing is buffered whole.

use super::{AppState, request_context};
use crate::{
    errors::AppError,
    models::object::{ObjectMetadata, ObjectRef, Properties},
    services::{ByteRange, FetchOptions, LocateOptions, ObjectCreate, ObjectSource, TrustLevel},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::io;

/// Prefix of the headers carrying user properties.
pub const PROPERTY_HEADER_PREFIX: &str = "x-oio-meta-";
pub const HEADER_POLICY: &str = "x-oio-storage-policy";
pub const HEADER_VERSION: &str = "x-oio-version";

#[derive(Debug, Default, Deserialize)]
pub struct ObjectQuery {
    pub version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PutQuery {
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct HeadQuery {
    pub version: Option<i64>,
    /// 0: metadata only, 2: every chunk.
    pub trust_level: Option<u8>,
}

/// `POST` actions on an object.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectAction {
    Locate,
    Fastcopy,
    Drain,
    Touch,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub action: ObjectAction,
    pub version: Option<i64>,
    /// Probe every chunk when locating.
    #[serde(default)]
    pub chunk_info: bool,
    pub to_account: Option<String>,
    pub to_container: Option<String>,
    pub to_name: Option<String>,
}

/// Property changes sent as the JSON body of `PATCH`.
#[derive(Debug, Default, Deserialize)]
pub struct PropertiesPatch {
    #[serde(default)]
    pub set: Properties,
    #[serde(default)]
    pub delete: Vec<String>,
}

pub(crate) fn user_properties(headers: &HeaderMap) -> Properties {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(PROPERTY_HEADER_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// PUT `/v1/{account}/{container}/{*object}`: upload (or append to) an object.
pub async fn put_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<PutQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    let mut request = ObjectCreate::new(&account, &container, &name, ObjectSource::Stream(stream))
        .with_properties(user_properties(&headers));
    if let Some(mime_type) = header_str(&headers, header::CONTENT_TYPE) {
        request = request.with_mime_type(mime_type);
    }
    if let Some(etag) = header_str(&headers, header::IF_MATCH) {
        request = request.with_etag(etag.trim_matches('"'));
    }
    if let Some(policy) = header_str(&headers, HEADER_POLICY) {
        request = request.with_policy(policy);
    }
    if query.append {
        request = request.appending();
    }

    let created = state.storage.object_create(&ctx, request).await?;

    let mut response = Json(json!({
        "object": created.meta,
        "chunks": created.chunks.len(),
        "size": created.size,
        "hash": created.hash,
    }))
    .into_response();
    *response.status_mut() = StatusCode::CREATED;
    set_object_headers(response.headers_mut(), &created.meta, None);
    Ok(response)
}

/// GET `/v1/{account}/{container}/{*object}` with optional `Range`.
pub async fn get_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let ranges = match header_str(&headers, header::RANGE) {
        Some(value) => ByteRange::parse_header(value)?,
        None => Vec::new(),
    };
    let options = FetchOptions {
        version: query.version,
        ranges: ranges.clone(),
        key_file: None,
    };
    let (meta, stream) = state
        .storage
        .object_fetch(&ctx, &account, &container, &name, options)
        .await?;

    let mut response = Response::new(Body::from_stream(stream));
    match ranges.as_slice() {
        [] => {
            set_object_headers(response.headers_mut(), &meta, Some(meta.length));
        }
        [range] => {
            let end = range
                .end
                .unwrap_or(u64::MAX)
                .min(meta.length.saturating_sub(1));
            set_object_headers(response.headers_mut(), &meta, Some(end - range.start + 1));
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {}-{}/{}", range.start, end, meta.length))
            {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
        }
        _ => {
            // Several ranges are sent back to back.
            set_object_headers(response.headers_mut(), &meta, None);
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
        }
    }
    Ok(response)
}

/// HEAD `/v1/{account}/{container}/{*object}`: existence at the requested trust level.
pub async fn head_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<HeadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let trust = TrustLevel::from_level(query.trust_level.unwrap_or(0))?;
    let exists = state
        .storage
        .object_head(&ctx, &account, &container, &name, query.version, trust)
        .await?;
    if !exists {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let meta = state
        .storage
        .object_get_properties(&ctx, &account, &container, &name, query.version)
        .await?;
    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta, Some(meta.length));
    Ok(response)
}

/// DELETE `/v1/{account}/{container}/{*object}`.
pub async fn delete_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    state
        .storage
        .object_delete(&ctx, &account, &container, &name, query.version)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH `/v1/{account}/{container}/{*object}`: set and delete user properties.
pub async fn patch_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    Json(patch): Json<PropertiesPatch>,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    if !patch.set.is_empty() {
        state
            .storage
            .object_set_properties(&ctx, &account, &container, &name, query.version, &patch.set)
            .await?;
    }
    if !patch.delete.is_empty() {
        state
            .storage
            .object_del_properties(&ctx, &account, &container, &name, query.version, &patch.delete)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/v1/{account}/{container}/{*object}?action=...`.
pub async fn post_object(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<PostQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let storage = &state.storage;
    let version = query.version;
    match query.action {
        ObjectAction::Locate => {
            let options = LocateOptions {
                properties: true,
                chunk_info: query.chunk_info,
            };
            let (meta, chunks) = storage
                .object_locate(&ctx, &account, &container, &name, version, options)
                .await?;
            Ok(Json(json!({ "object": meta, "chunks": chunks })).into_response())
        }
        ObjectAction::Fastcopy => {
            if query.to_account.is_none() && query.to_container.is_none() && query.to_name.is_none() {
                return Err(AppError::bad_request("fastcopy needs a destination"));
            }
            let source = ObjectRef::new(&account, &container, &name);
            let destination = ObjectRef::new(
                query.to_account.unwrap_or_else(|| account.clone()),
                query.to_container.unwrap_or_else(|| container.clone()),
                query.to_name.unwrap_or_else(|| name.clone()),
            );
            if destination == source {
                return Err(AppError::bad_request("fastcopy onto itself"));
            }
            storage
                .object_fastcopy(&ctx, &source, &destination, version)
                .await?;
            Ok(StatusCode::CREATED.into_response())
        }
        ObjectAction::Drain => {
            storage
                .object_drain(&ctx, &account, &container, &name, version)
                .await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        ObjectAction::Touch => {
            storage
                .object_touch(&ctx, &account, &container, &name, version)
                .await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMetadata, length: Option<u64>) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    if !meta.hash.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.hash)) {
            headers.insert(header::ETAG, value);
        }
    }
    headers.insert(HeaderName::from_static(HEADER_VERSION), HeaderValue::from(meta.version));
    for (key, value) in &meta.properties {
        let name = HeaderName::try_from(format!("{PROPERTY_HEADER_PREFIX}{key}"));
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
}
