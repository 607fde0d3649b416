use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::{
        identity::Identity,
        round::{
            GroupsRequest, GuessRequest, MarksRequest, PromptRequest, RevealRequest, VoteRequest,
        },
    },
    error::AppError,
    services::round_service,
    state::SharedState,
};

/// Round action routes. Every action answers 204 once the transition is committed.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/round/prompt", post(submit_prompt))
        .route("/sessions/{id}/round/guess", post(submit_guess))
        .route("/sessions/{id}/round/close", post(close_guessing))
        .route("/sessions/{id}/round/marks", post(submit_marks))
        .route("/sessions/{id}/round/groups", post(submit_groups))
        .route("/sessions/{id}/round/read/next", post(read_next))
        .route("/sessions/{id}/round/read/skip", post(read_skip))
        .route("/sessions/{id}/round/vote", post(submit_vote))
        .route("/sessions/{id}/round/reveal", post(reveal))
        .route("/sessions/{id}/round/proceed", post(proceed))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/prompt",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = PromptRequest,
    responses(
        (status = 204, description = "Prompt stored; guessing is open"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Store the dasher's prompt.
pub async fn submit_prompt(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<PromptRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::submit_prompt(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/guess",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = GuessRequest,
    responses(
        (status = 204, description = "Guess stored"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Submit or replace the caller's guess.
pub async fn submit_guess(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<GuessRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::submit_guess(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/close",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    responses(
        (status = 204, description = "Guessing closed"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Close the guessing window.
pub async fn close_guessing(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
) -> Result<StatusCode, AppError> {
    round_service::close_guessing(&state, &id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/marks",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = MarksRequest,
    responses(
        (status = 204, description = "Marks applied; round moved to GROUP, READ or TALLY"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Mark correct guesses.
pub async fn submit_marks(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<MarksRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::submit_marks(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/groups",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = GroupsRequest,
    responses(
        (status = 204, description = "Decoys grouped; round moved to READ or TALLY"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Assign decoy labels to wrong guesses.
pub async fn submit_groups(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<GroupsRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::submit_groups(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/read/next",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    responses(
        (status = 204, description = "Next card shown, or voting opened"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Advance the read-out by one card.
pub async fn read_next(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
) -> Result<StatusCode, AppError> {
    round_service::read_next(&state, &id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/read/skip",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    responses(
        (status = 204, description = "Voting opened"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Skip the rest of the read-out.
pub async fn read_skip(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
) -> Result<StatusCode, AppError> {
    round_service::read_skip(&state, &id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/vote",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = VoteRequest,
    responses(
        (status = 204, description = "Vote stored"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Vote for a read-out label.
pub async fn submit_vote(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<VoteRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::submit_vote(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/reveal",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    request_body = RevealRequest,
    responses(
        (status = 204, description = "Scores applied"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Close voting and score the round.
pub async fn reveal(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
    Valid(Json(payload)): Valid<Json<RevealRequest>>,
) -> Result<StatusCode, AppError> {
    round_service::reveal(&state, &id, &actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/round/proceed",
    tag = "round",
    params(
        ("id" = String, Path, description = "Session code"),
        ("x-username" = String, Header, description = "Authenticated username"),
        ("x-device-id" = Option<String>, Header, description = "Device identifier")
    ),
    responses(
        (status = 204, description = "Next round seeded, or game finished"),
        (status = 403, description = "Caller may not perform this action"),
        (status = 409, description = "Round is not in the expected stage")
    )
)]
/// Leave the tally.
pub async fn proceed(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Identity(actor): Identity,
) -> Result<StatusCode, AppError> {
    round_service::proceed(&state, &id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
