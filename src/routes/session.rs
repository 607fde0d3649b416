use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::{identity::Identity, session::KickRequest},
    error::AppError,
    services::session_service,
    state::{SharedState, session::Session},
};

/// Session-level routes: snapshot lookup, launch and kick.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/launch", post(launch))
        .route("/sessions/{id}/kick", post(kick))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Current session document", body = Session),
        (status = 404, description = "Unknown session")
    )
)]
/// Return a fresh snapshot of the session.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    let session = session_service::get_session(&state, &id).await?;
    Ok(Json(session))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/launch",
    tag = "session",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    responses(
        (status = 204, description = "Game started"),
        (status = 403, description = "Caller is not the host player"),
        (status = 409, description = "Session already started")
    )
)]
/// Start the game; only the host player may do so.
pub async fn launch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
) -> Result<StatusCode, AppError> {
    session_service::launch(&state, &id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/kick",
    tag = "session",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = KickRequest,
    responses(
        (status = 204, description = "Player removed and current round reseeded"),
        (status = 400, description = "Unknown player")
    )
)]
/// Remove a player from the session.
pub async fn kick(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<KickRequest>>,
) -> Result<StatusCode, AppError> {
    session_service::kick(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
