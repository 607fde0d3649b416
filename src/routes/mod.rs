use axum::Router;

use crate::state::SharedState;

/// Swagger UI.
pub mod docs;
/// Health check.
pub mod health;
/// Round actions.
pub mod round;
/// Session lookup and moderation.
pub mod session;

/// Full HTTP surface: health, session and round actions, and the API docs.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(health::router())
        .merge(session::router())
        .merge(round::router())
        .merge(docs::router())
        .with_state(state)
}
