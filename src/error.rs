use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::engine::{EngineError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Engine(err) => {
                let status = match err.kind() {
                    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::Transient => {
                        tracing::error!("Store error: {}", err);
                        return (
                            StatusCode::SERVICE_UNAVAILABLE,
                            err.code(),
                            "Service temporarily unavailable".to_string(),
                        );
                    }
                };
                (status, err.code(), err.to_string())
            }
            AppError::Auth(err) => match err {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "invalid_credentials",
                    err.to_string(),
                ),
                AuthError::UsernameTaken => {
                    (StatusCode::CONFLICT, "username_taken", err.to_string())
                }
                AuthError::Validation(msg) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_error",
                    msg.clone(),
                ),
                AuthError::Store(e) => {
                    tracing::error!("Store error: {}", e);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "transient",
                        "Service temporarily unavailable".to_string(),
                    )
                }
                AuthError::Hashing(e) => {
                    tracing::error!("Password hashing error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "Internal server error".to_string(),
                    )
                }
            },
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
