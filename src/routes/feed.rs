use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::feed::{Comment, NewPost, Post};
use crate::state::AppState;

const DEFAULT_PAGE: u32 = 20;

#[derive(Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed", get(public_feed))
        .route("/posts", post(create_post))
        .route("/posts/{id}", get(show_post))
        .route(
            "/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
}

async fn public_feed(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<Post>>> {
    let posts = state
        .feed
        .public_feed(query.limit.unwrap_or(DEFAULT_PAGE))
        .await?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewPost>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.feed.create_post(&user.actor, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn show_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    Ok(Json(state.feed.post(&id).await?))
}

async fn list_comments(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.feed.comments(&id).await?))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .feed
        .create_comment(&user.actor, &id, &req.body, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
