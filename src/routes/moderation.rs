use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::accounts::UnblockRequest;
use crate::approval::{GatedItem, GatedKind};
use crate::authority::{CapabilitySet, RoleAuthority};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::lifecycle::{ContentKind, ModeratedEntity};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct CapabilitiesResponse {
    pub kind: String,
    pub id: String,
    pub capabilities: CapabilitySet,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/capabilities/{kind}/{id}", get(capabilities))
        .route("/moderation/{kind}/{id}/delete", post(soft_delete))
        .route("/moderation/{kind}/{id}/restore", post(restore))
        .route("/moderation/{kind}/{id}/purge", post(purge))
        .route("/moderation/queue/{gated_kind}", get(queue))
        .route(
            "/moderation/approvals/{gated_kind}/{id}/approve",
            post(approve),
        )
        .route(
            "/moderation/approvals/{gated_kind}/{id}/reject",
            post(reject),
        )
        .route("/moderation/unblock-requests", get(unblock_requests))
}

fn content_kind(kind: &str) -> AppResult<ContentKind> {
    ContentKind::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown content kind: {}", kind)))
}

fn gated_kind(kind: &str) -> AppResult<GatedKind> {
    GatedKind::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown approval kind: {}", kind)))
}

/// GET /capabilities/{kind}/{id}: what the caller may do to an entity
async fn capabilities(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<CapabilitiesResponse>> {
    let capabilities = if let Some(content) = ContentKind::parse(&kind) {
        let entity = state.lifecycle.inspect(content, &id).await?;
        RoleAuthority::capabilities_for(&user.actor, &entity.target())
    } else {
        let item = state.approvals.item(gated_kind(&kind)?, &id).await?;
        RoleAuthority::capabilities_for(&user.actor, &item.target())
    };

    Ok(Json(CapabilitiesResponse {
        kind,
        id,
        capabilities,
    }))
}

async fn soft_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
    Json(req): Json<DeleteRequest>,
) -> AppResult<Json<ModeratedEntity>> {
    let entity = state
        .lifecycle
        .soft_delete(&user.actor, content_kind(&kind)?, &id, req.reason, Utc::now())
        .await?;
    Ok(Json(entity))
}

async fn restore(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<ModeratedEntity>> {
    let entity = state
        .lifecycle
        .restore(&user.actor, content_kind(&kind)?, &id)
        .await?;
    Ok(Json(entity))
}

async fn purge(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    state
        .lifecycle
        .hard_delete(&user.actor, content_kind(&kind)?, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn queue(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(kind): Path<String>,
) -> AppResult<Json<Vec<GatedItem>>> {
    let items = state
        .approvals
        .pending_queue(&user.actor, gated_kind(&kind)?)
        .await?;
    Ok(Json(items))
}

async fn approve(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<GatedItem>> {
    let item = state
        .approvals
        .approve(&user.actor, gated_kind(&kind)?, &id, Utc::now())
        .await?;
    Ok(Json(item))
}

async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> AppResult<Json<GatedItem>> {
    let item = state
        .approvals
        .reject(&user.actor, gated_kind(&kind)?, &id, Utc::now())
        .await?;
    Ok(Json(item))
}

async fn unblock_requests(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<UnblockRequest>>> {
    Ok(Json(state.accounts.unblock_requests(&user.actor).await?))
}
