pub mod accounts;
pub mod auth;
pub mod events;
pub mod feed;
pub mod jobs;
pub mod moderation;
pub mod surveys;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(feed::router())
        .merge(moderation::router())
        .merge(events::router())
        .merge(jobs::router())
        .merge(surveys::router())
        .merge(accounts::router())
}
