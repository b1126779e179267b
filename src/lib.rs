// Library exports for medcircle
// This allows integration tests and external code to use medcircle modules

pub mod accounts;
pub mod approval;
pub mod auth;
pub mod authority;
pub mod config;
pub mod dates;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod extractors;
pub mod feed;
pub mod ids;
pub mod jobs;
pub mod lifecycle;
pub mod routes;
pub mod state;
pub mod surveys;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP application over a prepared state
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
