use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auth::{LoginRequest, Session, SessionUser, SignupRequest};
use crate::error::AppResult;
use crate::extractors::{extract_session_token, CurrentUser};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn with_session(state: &AppState, status: StatusCode, session: Session) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &session.token,
        state.config.auth.session_hours,
    );
    (status, [(header::SET_COOKIE, cookie)], Json(session.user)).into_response()
}

/// POST /auth/signup: create an account and log it in
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<Response> {
    let session = state.auth.signup(req).await?;
    Ok(with_session(&state, StatusCode::CREATED, session))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let session = state.auth.login(req).await?;
    Ok(with_session(&state, StatusCode::OK, session))
}

/// POST /auth/logout: delete the session and clear the cookie
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = extract_session_token(&headers, cookie_name) {
        state.auth.logout(token).await?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
    )
        .into_response())
}

async fn me(user: CurrentUser) -> Json<SessionUser> {
    Json(SessionUser {
        actor: user.actor,
        username: user.username,
    })
}
