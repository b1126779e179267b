use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::jobs::{JobApplication, JobListing, NewJobListing};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub cover_letter: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(post_listing))
        .route("/jobs/{id}/active", post(set_active))
        .route(
            "/jobs/{id}/applications",
            post(apply).get(list_applications),
        )
        .route("/applications/{id}/review", post(mark_reviewed))
        .route("/applications/{id}/accept", post(accept))
        .route("/applications/{id}/reject", post(reject))
}

async fn post_listing(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewJobListing>,
) -> AppResult<(StatusCode, Json<JobListing>)> {
    let listing = state.jobs.post_listing(&user.actor, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn set_active(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> AppResult<Json<JobListing>> {
    let listing = state
        .jobs
        .set_active(&user.actor, &job_id, req.active)
        .await?;
    Ok(Json(listing))
}

async fn apply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
    Json(req): Json<ApplyRequest>,
) -> AppResult<(StatusCode, Json<JobApplication>)> {
    let application = state
        .jobs
        .apply(&user.actor, &job_id, req.cover_letter, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn list_applications(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
) -> AppResult<Json<Vec<JobApplication>>> {
    Ok(Json(state.jobs.applications(&user.actor, &job_id).await?))
}

async fn mark_reviewed(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<JobApplication>> {
    Ok(Json(
        state.jobs.mark_reviewed(&user.actor, &id, Utc::now()).await?,
    ))
}

async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<JobApplication>> {
    Ok(Json(state.jobs.accept(&user.actor, &id, Utc::now()).await?))
}

async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<JobApplication>> {
    Ok(Json(state.jobs.reject(&user.actor, &id, Utc::now()).await?))
}
