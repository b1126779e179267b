use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::accounts::{Account, UnblockRequest};
use crate::authority::Role;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Deserialize)]
pub struct UnblockRequestBody {
    #[serde(default)]
    pub message: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/me/unblock-request", post(request_unblock))
        .route("/accounts/{id}", get(profile))
        .route("/accounts/{id}/block", post(block))
        .route("/accounts/{id}/unblock", post(unblock))
        .route("/accounts/{id}/role", post(change_role))
}

async fn profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.accounts.profile(&user.actor, &id).await?))
}

async fn block(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.accounts.block(&user.actor, &id).await?))
}

async fn unblock(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.accounts.unblock(&user.actor, &id).await?))
}

async fn change_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ChangeRoleRequest>,
) -> AppResult<Json<Account>> {
    Ok(Json(
        state.accounts.change_role(&user.actor, &id, req.role).await?,
    ))
}

async fn request_unblock(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UnblockRequestBody>,
) -> AppResult<(StatusCode, Json<UnblockRequest>)> {
    let request = state
        .accounts
        .request_unblock(&user.actor, req.message, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}
