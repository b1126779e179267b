use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::engine::EngineError;
use crate::error::AppResult;
use crate::events::{EventRegistration, Roster};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/{id}/registrations", post(register).get(roster))
        .route("/events/{id}/registrations/me", get(my_registration))
        .route("/registrations/{id}/approve", post(approve))
        .route("/registrations/{id}/reject", post(reject))
}

async fn register(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> AppResult<(StatusCode, Json<EventRegistration>)> {
    let registration = state
        .events
        .register(&user.actor, &event_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn roster(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> AppResult<Json<Roster>> {
    Ok(Json(state.events.roster(&user.actor, &event_id).await?))
}

async fn my_registration(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(event_id): Path<String>,
) -> AppResult<Json<EventRegistration>> {
    let registration = state
        .events
        .registration_of(&user.actor.id, &event_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("registration for event {}", event_id)))?;
    Ok(Json(registration))
}

async fn approve(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<EventRegistration>> {
    Ok(Json(state.events.approve(&user.actor, &id, Utc::now()).await?))
}

async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<EventRegistration>> {
    Ok(Json(state.events.reject(&user.actor, &id, Utc::now()).await?))
}
