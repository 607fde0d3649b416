//! Round actions: each one maps a request onto a single state machine event.

use crate::{
    dto::round::{
        GroupsRequest, GuessRequest, MarksRequest, PromptRequest, RevealRequest, VoteRequest,
    },
    error::ServiceError,
    state::{
        SharedState,
        handle::Actor,
        state_machine::{GameEvent, Phase},
    },
};

/// Dasher stores the prompt and opens guessing.
pub async fn submit_prompt(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: PromptRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::SubmitPrompt(request.into()))
        .await
}

/// A player writes or rewrites their guess.
pub async fn submit_guess(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: GuessRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(
            session_id,
            actor,
            GameEvent::SubmitGuess {
                text: request.guess,
            },
        )
        .await
}

/// Dasher ends the guessing window.
pub async fn close_guessing(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::CloseGuessing)
        .await
}

/// Dasher flags correct guesses; the interruption policy picks the next stage.
pub async fn submit_marks(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: MarksRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::SubmitMarks(request.marks))
        .await
}

/// Dasher labels wrong guesses; the interruption policy picks the next stage.
pub async fn submit_groups(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: GroupsRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::SubmitGroups(request.groups))
        .await
}

/// Dasher reveals the next read-out card.
pub async fn read_next(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::ReadNext)
        .await
}

/// Dasher jumps to voting.
pub async fn read_skip(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::ReadSkip)
        .await
}

/// A player votes for a read-out label.
pub async fn submit_vote(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: VoteRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(
            session_id,
            actor,
            GameEvent::SubmitVote {
                label: request.label,
            },
        )
        .await
}

/// Dasher closes voting; scores are computed from the stored round.
pub async fn reveal(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
    request: RevealRequest,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(
            session_id,
            actor,
            GameEvent::Reveal {
                votes: request.votes,
            },
        )
        .await
}

/// Dasher leaves the tally: next round, or the end of the game.
pub async fn proceed(
    state: &SharedState,
    session_id: &str,
    actor: &Actor,
) -> Result<Phase, ServiceError> {
    state
        .run_transition(session_id, actor, GameEvent::Proceed)
        .await
}
