use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::inbox::InboxItem;
use crate::state::AppState;
use crate::triage::service::{
    ConfirmInput, ConfirmResult, CreateInboxItem, InboxItemView, InboxQuery,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdParam {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInboxItemRequest {
    pub user_id: Uuid,
    pub source: Option<String>,
    #[serde(default)]
    pub raw_text: String,
    pub raw_media_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInboxParams {
    pub user_id: Uuid,
    pub status: Option<String>,
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxListResponse {
    pub items: Vec<InboxItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub user_id: Uuid,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub flag_id: Option<String>,
    pub subflag_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// POST /v1/inbox-items
pub async fn handle_create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateInboxItemRequest>,
) -> Result<(StatusCode, Json<InboxItem>), AppError> {
    let item = state
        .triage
        .create_item(
            req.user_id,
            CreateInboxItem {
                source: req.source,
                raw_text: req.raw_text,
                raw_media_url: req.raw_media_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /v1/inbox-items
pub async fn handle_list_items(
    State(state): State<AppState>,
    Query(params): Query<ListInboxParams>,
) -> Result<Json<InboxListResponse>, AppError> {
    let page = state
        .triage
        .list_items(
            params.user_id,
            InboxQuery {
                status: params.status,
                source: params.source,
                limit: params.limit,
                cursor: params.cursor,
            },
        )
        .await?;
    Ok(Json(InboxListResponse {
        items: page.items,
        next_cursor: page.next_cursor,
    }))
}

/// GET /v1/inbox-items/:id
pub async fn handle_get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdParam>,
) -> Result<Json<InboxItemView>, AppError> {
    Ok(Json(state.triage.get_item(params.user_id, id).await?))
}

/// POST /v1/inbox-items/:id/reprocess
pub async fn handle_reprocess(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserIdParam>,
) -> Result<Json<InboxItemView>, AppError> {
    Ok(Json(state.triage.reprocess(req.user_id, id).await?))
}

/// POST /v1/inbox-items/:id/confirm
pub async fn handle_confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResult>, AppError> {
    let result = state
        .triage
        .confirm(
            req.user_id,
            id,
            ConfirmInput {
                kind: req.kind,
                title: req.title,
                flag_id: req.flag_id,
                subflag_id: req.subflag_id,
                payload: req.payload,
            },
        )
        .await?;
    Ok(Json(result))
}

/// POST /v1/inbox-items/:id/dismiss
pub async fn handle_dismiss(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserIdParam>,
) -> Result<Json<InboxItem>, AppError> {
    Ok(Json(state.triage.dismiss(req.user_id, id).await?))
}
