use crate::{
    dto::session::KickRequest,
    error::ServiceError,
    state::{
        SharedState,
        handle::Actor,
        session::Session,
        state_machine::{GameEvent, Phase},
    },
};

/// Fresh snapshot of a session, as stored.
pub async fn get_session(state: &SharedState, session_id: &str) -> Result<Session, ServiceError> {
    let handle = state.fetch_session(session_id).await?;
    Ok(handle.session().clone())
}

/// Start the game from the lobby.
pub async fn launch(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::Launch)
        .await
}

/// Remove a player and reseed the current round without them.
pub async fn kick(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: KickRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(
            session_id,
            actor,
            GameEvent::Kick {
                target: request.username,
            },
        )
        .await
}
