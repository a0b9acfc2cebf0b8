//! HTTP handlers for accounts under `/v1` and `/v1/{account}`.

use super::{AppState, request_context};
use crate::{
    errors::AppError,
    models::{listing::ContainerListParams, object::Properties},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct ListContainersQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub end_marker: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountPatch {
    #[serde(default)]
    pub set: Properties,
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountAction {
    Refresh,
    Flush,
}

#[derive(Debug, Deserialize)]
pub struct AccountPostQuery {
    pub action: AccountAction,
}

/// GET `/v1`: every account name.
pub async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let accounts = state.storage.account_list(&ctx).await?;
    Ok(Json(json!({ "accounts": accounts })).into_response())
}

/// POST `/v1?action=refresh`: refresh every account.
pub async fn refresh_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    state.storage.account_refresh(&ctx, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT `/v1/{account}`: 201 when created, 204 when it existed.
pub async fn create_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    let created = state.storage.account_create(&ctx, &account).await?;
    Ok(if created {
        StatusCode::CREATED
    } else {
        StatusCode::NO_CONTENT
    })
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    state.storage.account_delete(&ctx, &account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/v1/{account}`: account summary and one page of its containers.
pub async fn show_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(q): Query<ListContainersQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let ctx = request_context(&headers)?;
    let info = state.storage.account_show(&ctx, &account).await?;
    let params = ContainerListParams {
        limit: q.limit,
        marker: q.marker,
        end_marker: q.end_marker,
        prefix: q.prefix,
        delimiter: q.delimiter,
    };
    let containers = state
        .storage
        .container_list(&ctx, &account, &params)
        .await?;
    Ok(Json(json!({ "account": info, "containers": containers })).into_response())
}

pub async fn patch_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<AccountPatch>,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    if !patch.set.is_empty() {
        state
            .storage
            .account_set_properties(&ctx, &account, &patch.set)
            .await?;
    }
    if !patch.delete.is_empty() {
        state
            .storage
            .account_del_properties(&ctx, &account, &patch.delete)
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/v1/{account}?action=refresh|flush`.
pub async fn post_account(
    State(state): State<AppState>,
    Path(account): Path<String>,
    Query(query): Query<AccountPostQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = request_context(&headers)?;
    match query.action {
        AccountAction::Refresh => state.storage.account_refresh(&ctx, Some(&account)).await?,
        AccountAction::Flush => state.storage.account_flush(&ctx, &account).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}
