//! HTTP handlers for container operations under `/v1/{account}/{container}`.

use super::{AppState, object_handlers::user_properties, request_context};
use crate::{
    errors::AppError,
    models::{listing::ListParams, object::Properties},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use serde_json::json;

/// Query params of a container listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub limit: Option<usize>,
    /// Opaque token returned by the previous page; takes over `marker`.
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub versions: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub properties: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerPatch {
    #[serde(default)]
    pub set: Properties,
    #[serde(default)]
    pub system: Properties,
    #[serde(default)]
    pub delete: Vec<String>,
    /// Drop user properties not in `set`.
    #[serde(default)]
    pub clear: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
    Show,
    Snapshot,
    Purge,
    Refresh,
    Touch,
    /// Delete the objects named in the JSON body.
    DeleteMany,
}

#[derive(Debug, Deserialize)]
pub struct ContainerPostQuery {
    pub action: ContainerAction,
    pub dst_account: Option<String>,
    pub dst_container: Option<String>,
    pub batch_size: Option<usize>,
    pub maxvers: Option<i64>,
}

/// Names of the objects to delete in one call.
#[derive(Debug, Deserialize)]
pub struct DeleteManyReq {
    pub names: Vec<String>,
}

/// PUT `/v1/{account}/{container}`: 201 when created, 204 when it existed.
pub async fn create_container(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    let properties = user_properties(&headers);
    let created = state
        .storage
        .container_create(&ctx, &account, &container, &properties)
        .await?;
    Ok(if created {
        StatusCode::CREATED
    } else {
        StatusCode::NO_CONTENT
    })
}

/// DELETE `/v1/{account}/{container}`.
pub async fn delete_container(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    state
        .storage
        .container_delete(&ctx, &account, &container)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/v1/{account}/{container}`: one page of objects.
pub async fn list_objects(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
    Query(q): Query<ListObjectsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let marker = match q.continuation_token.as_deref() {
        Some(token) => Some(decode_continuation_token(token)?),
        None => q.marker,
    };
    let params = ListParams {
        limit: q.limit.map(|limit| limit.clamp(1, 10_000)),
        marker,
        end_marker: q.end_marker,
        prefix: q.prefix,
        delimiter: q.delimiter,
        properties: q.properties,
        versions: q.versions,
        deleted: q.deleted,
    };
    let page = state
        .storage
        .object_list(&ctx, &account, &container, &params)
        .await?;
    let next_token = page
        .next_marker
        .as_deref()
        .filter(|_| page.truncated)
        .map(encode_continuation_token);
    Ok(Json(json!({
        "objects": page.objects,
        "prefixes": page.prefixes,
        "truncated": page.truncated,
        "next_marker": page.next_marker,
        "next_continuation_token": next_token,
    }))
    .into_response())
}

/// PATCH `/v1/{account}/{container}`: property changes.
pub async fn patch_container(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
    headers: HeaderMap,
    Json(patch): Json<ContainerPatch>,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    if !patch.set.is_empty() || !patch.system.is_empty() || patch.clear {
        state
            .storage
            .container_set_properties(&ctx, &account, &container, &patch.set, &patch.system, patch.clear)
            .await?;
    }
    if !patch.delete.is_empty() {
        state
            .storage
            .container_del_properties(&ctx, &account, &container, &patch.delete)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/v1/{account}/{container}?action=...`.
pub async fn post_container(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
    Query(query): Query<ContainerPostQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let storage = &state.storage;
    match query.action {
        ContainerAction::Show => {
            let info = storage.container_show(&ctx, &account, &container).await?;
            Ok(Json(info).into_response())
        }
        ContainerAction::Snapshot => {
            let dst_container = query
                .dst_container
                .ok_or_else(|| AppError::bad_request("snapshot needs dst_container"))?;
            let dst_account = query.dst_account.unwrap_or_else(|| account.clone());
            let report = storage
                .container_snapshot(&ctx, &account, &container, &dst_account, &dst_container, query.batch_size)
                .await?;
            Ok((StatusCode::CREATED, Json(report)).into_response())
        }
        ContainerAction::Purge => {
            let deleted = storage
                .container_purge(&ctx, &account, &container, query.maxvers)
                .await?;
            let deleted: Vec<_> = deleted
                .into_iter()
                .map(|(name, version)| json!({ "name": name, "version": version }))
                .collect();
            Ok(Json(json!({ "deleted": deleted })).into_response())
        }
        ContainerAction::Refresh => {
            storage.container_refresh(&ctx, &account, &container).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        ContainerAction::Touch => {
            storage.container_touch(&ctx, &account, &container).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        ContainerAction::DeleteMany => {
            let req: DeleteManyReq = serde_json::from_slice(&body)
                .map_err(|err| AppError::bad_request(format!("invalid body: {err}")))?;
            let results: Vec<_> = storage
                .object_delete_many(&ctx, &account, &container, &req.names)
                .await?
                .into_iter()
                .map(|(name, deleted)| json!({ "name": name, "deleted": deleted }))
                .collect();
            Ok(Json(json!({ "results": results })).into_response())
        }
    }
}

fn encode_continuation_token(marker: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(marker)
}

fn decode_continuation_token(token: &str) -> Result<String, AppError> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::bad_request("invalid continuation token"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_tokens_hide_the_marker() {
        let token = encode_continuation_token("photos/été 2024.jpg");
        assert!(!token.contains('/'));
        assert_eq!(decode_continuation_token(&token).unwrap(), "photos/été 2024.jpg");
        assert!(decode_continuation_token("!!").is_err());
    }
}
