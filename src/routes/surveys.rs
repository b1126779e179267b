use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::surveys::{SurveyAnswer, SurveyTally};

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub question_index: u32,
    pub answer: SurveyAnswer,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/surveys/{post_id}/answers", post(submit_answer))
        .route("/surveys/{post_id}/results", get(results))
}

async fn submit_answer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> AppResult<StatusCode> {
    state
        .surveys
        .submit_answer(&user.actor, &post_id, req.question_index, req.answer, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn results(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<SurveyTally>> {
    Ok(Json(state.surveys.aggregate(&post_id).await?))
}
