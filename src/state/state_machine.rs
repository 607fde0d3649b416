//! Round state machine: events, the transition table and one planner per transition.

use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, seq::IndexedRandom, seq::SliceRandom};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::GameRules,
    dao::batch::{Precondition, WriteBatch},
    state::{
        handle::{Actor, SessionHandle, state_value},
        interruption::{self, Continuation, GROUP_INTERRUPTION, MARK_INTERRUPTION},
        normalize::normalize_guess,
        rotation::next_dasher,
        scoring::ScoringPolicy,
        session::{Guess, ReadOut, Round, RoundState, SessionState, TRUE_RESPONSE},
    },
};

/// Where a session stands, as seen by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Players are still gathering.
    Lobby,
    /// A round is being played in the given stage.
    Round(RoundState),
    /// The round limit was reached.
    Finished,
}

/// Prompt chosen by the dasher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSubmission {
    /// Category; empty keeps the seeded one.
    pub category: String,
    /// Word or phrase to define.
    pub prompt: String,
    /// True response.
    pub response: String,
    /// Written live by the dasher instead of drawn from a content source.
    pub custom: bool,
}

/// Player actions the state machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Host player starts the game.
    Launch,
    /// Remove a player from the session.
    Kick {
        /// Username to remove.
        target: String,
    },
    /// Dasher stores the round prompt.
    SubmitPrompt(PromptSubmission),
    /// A player writes (or rewrites) their guess.
    SubmitGuess {
        /// Raw guess text.
        text: String,
    },
    /// Dasher ends the guessing window.
    CloseGuessing,
    /// Dasher flags guesses as correct; unlisted guesses count as wrong.
    SubmitMarks(BTreeMap<String, bool>),
    /// Dasher assigns a decoy label to every wrong guess.
    SubmitGroups(BTreeMap<String, String>),
    /// Dasher moves to the next card.
    ReadNext,
    /// Dasher jumps straight to voting.
    ReadSkip,
    /// A player votes for a read-out label.
    SubmitVote {
        /// Read-out label voted for.
        label: String,
    },
    /// Dasher closes voting, optionally with the aggregated votes.
    Reveal {
        /// Replaces the stored votes when present.
        votes: Option<BTreeMap<String, String>>,
    },
    /// Dasher leaves the tally.
    Proceed,
}

/// Payload-free discriminant of [`GameEvent`], used by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// See [`GameEvent::Launch`].
    Launch,
    /// See [`GameEvent::Kick`].
    Kick,
    /// See [`GameEvent::SubmitPrompt`].
    SubmitPrompt,
    /// See [`GameEvent::SubmitGuess`].
    SubmitGuess,
    /// See [`GameEvent::CloseGuessing`].
    CloseGuessing,
    /// See [`GameEvent::SubmitMarks`].
    SubmitMarks,
    /// See [`GameEvent::SubmitGroups`].
    SubmitGroups,
    /// See [`GameEvent::ReadNext`].
    ReadNext,
    /// See [`GameEvent::ReadSkip`].
    ReadSkip,
    /// See [`GameEvent::SubmitVote`].
    SubmitVote,
    /// See [`GameEvent::Reveal`].
    Reveal,
    /// See [`GameEvent::Proceed`].
    Proceed,
}

impl GameEvent {
    /// Discriminant used by the transition table.
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::Launch => EventKind::Launch,
            GameEvent::Kick { .. } => EventKind::Kick,
            GameEvent::SubmitPrompt(_) => EventKind::SubmitPrompt,
            GameEvent::SubmitGuess { .. } => EventKind::SubmitGuess,
            GameEvent::CloseGuessing => EventKind::CloseGuessing,
            GameEvent::SubmitMarks(_) => EventKind::SubmitMarks,
            GameEvent::SubmitGroups(_) => EventKind::SubmitGroups,
            GameEvent::ReadNext => EventKind::ReadNext,
            GameEvent::ReadSkip => EventKind::ReadSkip,
            GameEvent::SubmitVote { .. } => EventKind::SubmitVote,
            GameEvent::Reveal { .. } => EventKind::Reveal,
            GameEvent::Proceed => EventKind::Proceed,
        }
    }
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the session was in when the event was received.
    pub from: Phase,
    /// The rejected event.
    pub event: EventKind,
}

/// Reasons a transition is refused. None of them writes anything.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The actor may not perform this action.
    #[error("{0}")]
    RoleViolation(String),
    /// Submitted fields are missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// The session moved on since the action was issued.
    #[error("{0}")]
    Stale(String),
    /// The event is not allowed in the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// A round payload could not be encoded for the store.
    #[error("failed to encode session update")]
    Encode(#[from] serde_json::Error),
}

/// Unique identifier for a planned transition, used to correlate logs.
pub type PlanId = Uuid;

/// A validated transition ready to be committed as one conditional write.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase before the transition.
    pub from: Phase,
    /// Phase after the transition.
    pub to: Phase,
    /// Event that produced the plan.
    pub event: EventKind,
    /// Values the store must still hold when the batch is applied.
    pub preconditions: Vec<Precondition>,
    /// Writes committed together.
    pub batch: WriteBatch,
}

/// Configuration and randomness handed to planners.
pub struct PlanContext<'a, R: Rng + ?Sized> {
    /// Game limits.
    pub rules: &'a GameRules,
    /// Points awarded at the tally.
    pub scoring: &'a ScoringPolicy,
    /// Texts used for synthetic decoys.
    pub decoys: &'a [String],
    /// Random source for rotation, decoys and shuffling.
    pub rng: &'a mut R,
}

/// Targets reachable from `from` through `event`.
pub fn allowed_targets(from: Phase, event: EventKind) -> Result<&'static [Phase], InvalidTransition> {
    use EventKind as E;
    use RoundState as S;

    let targets: &'static [Phase] = match (from, event) {
        (Phase::Lobby, E::Launch) => &[Phase::Round(S::Select)],
        (Phase::Lobby, E::Kick) => &[Phase::Lobby],
        (Phase::Round(S::Tally), E::Kick) => &[Phase::Round(S::Tally)],
        (Phase::Round(_), E::Kick) => &[Phase::Round(S::Select)],
        (Phase::Round(S::Select), E::SubmitPrompt) => &[Phase::Round(S::Guess)],
        (Phase::Round(S::Guess), E::SubmitGuess) => &[Phase::Round(S::Guess)],
        (Phase::Round(S::Guess), E::CloseGuessing) => &[Phase::Round(S::Mark)],
        (Phase::Round(S::Guess | S::Mark), E::SubmitMarks) => &[
            Phase::Round(S::Group),
            Phase::Round(S::Read),
            Phase::Round(S::Tally),
        ],
        (Phase::Round(S::Group), E::SubmitGroups) => {
            &[Phase::Round(S::Read), Phase::Round(S::Tally)]
        }
        (Phase::Round(S::Read), E::ReadNext) => &[Phase::Round(S::Read), Phase::Round(S::Vote)],
        (Phase::Round(S::Read), E::ReadSkip) => &[Phase::Round(S::Vote)],
        (Phase::Round(S::Vote), E::SubmitVote) => &[Phase::Round(S::Vote)],
        (Phase::Round(S::Vote), E::Reveal) => &[Phase::Round(S::Tally)],
        (Phase::Round(S::Tally), E::Proceed) => &[Phase::Round(S::Select), Phase::Finished],
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(targets)
}

/// Phase of the snapshot held by `handle`.
pub fn phase_of(handle: &SessionHandle) -> Result<Phase, TransitionError> {
    match handle.session().state {
        SessionState::Initiated => Ok(Phase::Lobby),
        SessionState::Finished => Ok(Phase::Finished),
        SessionState::Started => handle
            .round()
            .map(|round| Phase::Round(round.state))
            .ok_or_else(|| {
                TransitionError::Stale(format!("round {} does not exist", handle.current()))
            }),
    }
}

/// Validate `event` against the snapshot and compute its complete write.
pub fn plan<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    event: GameEvent,
    ctx: &mut PlanContext<'_, R>,
) -> Result<Plan, TransitionError> {
    handle.authorize(actor)?;

    let from = phase_of(handle)?;
    let kind = event.kind();
    let targets = allowed_targets(from, kind)?;

    let Effect {
        to,
        mut preconditions,
        mut batch,
    } = match event {
        GameEvent::Launch => launch(handle, actor, ctx)?,
        GameEvent::Kick { target } => kick(handle, actor, &target, ctx)?,
        GameEvent::SubmitPrompt(submission) => submit_prompt(handle, actor, submission, ctx)?,
        GameEvent::SubmitGuess { text } => submit_guess(handle, actor, &text, ctx)?,
        GameEvent::CloseGuessing => close_guessing(handle, actor)?,
        GameEvent::SubmitMarks(marks) => submit_marks(handle, actor, &marks, ctx)?,
        GameEvent::SubmitGroups(groups) => submit_groups(handle, actor, &groups, ctx)?,
        GameEvent::ReadNext => read_next(handle, actor)?,
        GameEvent::ReadSkip => read_skip(handle, actor)?,
        GameEvent::SubmitVote { label } => submit_vote(handle, actor, &label)?,
        GameEvent::Reveal { votes } => reveal(handle, actor, votes, ctx)?,
        GameEvent::Proceed => proceed(handle, actor, ctx)?,
    };

    if !targets.contains(&to) {
        return Err(InvalidTransition { from, event: kind }.into());
    }

    if let Phase::Round(state) = from {
        preconditions.extend(handle.round_preconditions(state));
    }
    batch.server_timestamp("updatedAt");

    Ok(Plan {
        id: Uuid::new_v4(),
        from,
        to,
        event: kind,
        preconditions,
        batch,
    })
}

/// Transition-specific part of a plan.
struct Effect {
    to: Phase,
    preconditions: Vec<Precondition>,
    batch: WriteBatch,
}

impl Effect {
    fn to(to: Phase) -> Self {
        Self {
            to,
            preconditions: Vec::new(),
            batch: WriteBatch::new(),
        }
    }
}

type PlanResult = Result<Effect, TransitionError>;

fn launch<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let session = handle.session();
    if session.host_player.as_deref() != Some(actor.username.as_str()) {
        return Err(TransitionError::RoleViolation(
            "only the host player can launch the game".into(),
        ));
    }

    let players = handle.players();
    if !players.contains(&actor.username) {
        return Err(TransitionError::RoleViolation(
            "the display screen cannot launch the game".into(),
        ));
    }
    if players.len() < ctx.rules.min_players {
        return Err(TransitionError::Validation(format!(
            "at least {} players are required",
            ctx.rules.min_players
        )));
    }
    if players.len() > ctx.rules.max_players {
        return Err(TransitionError::Validation(format!(
            "at most {} players can play",
            ctx.rules.max_players
        )));
    }

    let limit = match session.limit {
        0 => ctx.rules.default_rounds,
        limit => limit,
    };
    if !(ctx.rules.min_rounds..=ctx.rules.max_rounds).contains(&limit) {
        return Err(TransitionError::Validation(format!(
            "round limit must be between {} and {}",
            ctx.rules.min_rounds, ctx.rules.max_rounds
        )));
    }

    let mut effect = Effect::to(Phase::Round(RoundState::Select));
    effect.preconditions = vec![
        Precondition::new("state", state_value(&SessionState::Initiated)),
        handle.unchanged("limit"),
        handle.unchanged("current"),
        handle.unchanged("rounds"),
    ];

    let current = session.current.max(1);
    if session.current != current {
        effect.batch.set("current", current);
    }
    if session.limit == 0 {
        effect.batch.set("limit", ctx.rules.default_rounds);
    }

    let playable = handle
        .session()
        .rounds
        .get(&current)
        .is_some_and(|round| players.contains(&round.dasher));
    if !playable {
        let dasher = next_dasher(&[], &players, &BTreeSet::new(), ctx.rng)
            .ok_or_else(|| TransitionError::Validation("no player can dash".into()))?;
        let round = Round::seeded(dasher, pick_category(handle, ctx), ctx.rules.default_timer);
        effect
            .batch
            .set_serialized(SessionHandle::round_path(current), &round)?;
    }

    effect
        .batch
        .set("state", state_value(&SessionState::Started));
    Ok(effect)
}

fn kick<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    target: &str,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let players = handle.players();
    if !players.contains(&actor.username) {
        return Err(TransitionError::RoleViolation(
            "only players can remove someone".into(),
        ));
    }
    if target == actor.username {
        return Err(TransitionError::Validation("you cannot remove yourself".into()));
    }
    if !handle.session().scoreboard.contains_key(target)
        || handle.session().kicked.contains_key(target)
    {
        return Err(TransitionError::Validation(format!(
            "{target} is not in this session"
        )));
    }

    let from = phase_of(handle)?;
    let to = match from {
        Phase::Lobby => Phase::Lobby,
        Phase::Round(RoundState::Tally) => from,
        _ => Phase::Round(RoundState::Select),
    };
    let mut effect = Effect::to(to);
    effect.preconditions = vec![
        handle.unchanged("state"),
        handle.unchanged("current"),
        handle.unchanged(format!("kicked/{target}")),
    ];
    effect
        .batch
        .set(format!("kicked/{target}"), actor.username.clone())
        .delete(format!("scoreboard/{target}"));

    let Some(round) = handle.round() else {
        return Ok(effect);
    };
    let scored = to == Phase::Round(RoundState::Tally);
    if scored && round.dasher != target {
        return Ok(effect);
    }

    let remaining: Vec<String> = players.into_iter().filter(|p| p != target).collect();
    let exclusions = BTreeSet::from([target.to_string()]);
    let history = handle.dasher_history(handle.current().saturating_sub(1));
    let dasher = next_dasher(&history, &remaining, &exclusions, ctx.rng)
        .ok_or_else(|| TransitionError::Validation("no player left to dash".into()))?;

    if scored {
        // Scored rounds keep their guesses and votes; only the seat moves on.
        effect.batch.set(handle.current_path("dasher"), dasher);
    } else {
        let round = Round::seeded(dasher, pick_category(handle, ctx), ctx.rules.default_timer);
        effect
            .batch
            .set_serialized(handle.current_path(""), &round)?;
    }

    Ok(effect)
}

fn submit_prompt<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    submission: PromptSubmission,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let round = handle.require_dasher(actor)?;
    let prompt = submission.prompt.trim();
    let response = submission.response.trim();
    let rules = ctx.rules;

    if submission.custom {
        let prompt_len = prompt.chars().count();
        if !(rules.prompt_min_length..=rules.prompt_max_length).contains(&prompt_len) {
            return Err(TransitionError::Validation(format!(
                "prompt must be {} to {} characters",
                rules.prompt_min_length, rules.prompt_max_length
            )));
        }
        let response_len = response.chars().count();
        if !(rules.response_min_length..=rules.response_max_length).contains(&response_len) {
            return Err(TransitionError::Validation(format!(
                "response must be {} to {} characters",
                rules.response_min_length, rules.response_max_length
            )));
        }
    } else if prompt.is_empty() || response.is_empty() {
        return Err(TransitionError::Validation(
            "prompt and response are required".into(),
        ));
    }

    let category = match submission.category.trim() {
        "" => round.category.clone(),
        category => category.to_string(),
    };

    let mut effect = Effect::to(Phase::Round(RoundState::Guess));
    effect
        .batch
        .set(handle.current_path("category"), category)
        .set(handle.current_path("prompt"), prompt)
        .set(handle.current_path("response"), response)
        .set(handle.current_path("custom"), submission.custom)
        .set(
            handle.current_path("state"),
            state_value(&RoundState::Guess),
        );
    Ok(effect)
}

fn submit_guess<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    text: &str,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    handle.active_round()?;
    if !handle.guessers().contains(&actor.username) {
        return Err(TransitionError::RoleViolation(
            "the dasher and non-players cannot guess".into(),
        ));
    }

    let response = normalize_guess(text, ctx.rules.max_guess_length);
    if response.is_empty() {
        return Err(TransitionError::Validation("guess cannot be empty".into()));
    }

    let guess = Guess {
        response,
        ..Guess::default()
    };
    let mut effect = Effect::to(Phase::Round(RoundState::Guess));
    effect
        .batch
        .set_serialized(handle.guess_path(&actor.username, ""), &guess)?;
    Ok(effect)
}

fn close_guessing(handle: &SessionHandle, actor: &Actor) -> PlanResult {
    handle.require_dasher(actor)?;
    let mut effect = Effect::to(Phase::Round(RoundState::Mark));
    effect.batch.set(
        handle.current_path("state"),
        state_value(&RoundState::Mark),
    );
    Ok(effect)
}

fn submit_marks<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    marks: &BTreeMap<String, bool>,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let round = handle.require_dasher(actor)?;

    if let Some(unknown) = marks.keys().find(|user| {
        round
            .guesses
            .get(*user)
            .is_none_or(|guess| guess.automatic)
    }) {
        return Err(TransitionError::Validation(format!(
            "{unknown} did not submit a guess"
        )));
    }

    let mut guesses = round.guesses.clone();
    for (user, guess) in guesses.iter_mut().filter(|(_, guess)| !guess.automatic) {
        guess.correct = marks.get(user).copied().unwrap_or(false);
    }
    let correct: BTreeSet<String> = guesses
        .iter()
        .filter(|(_, guess)| guess.correct)
        .map(|(user, _)| user.clone())
        .collect();
    let incorrect: Vec<String> = guesses
        .iter()
        .filter(|(_, guess)| !guess.correct && !guess.automatic)
        .map(|(user, _)| user.clone())
        .collect();

    let voters = count_voters(handle, &incorrect);
    let continuation = interruption::decide(incorrect.len(), voters, handle.session().ais);

    let mut effect = Effect::to(Phase::Round(RoundState::Group));
    effect
        .preconditions
        .push(handle.unchanged(handle.current_path("guesses")));
    for (user, guess) in guesses.iter().filter(|(_, guess)| !guess.automatic) {
        effect
            .batch
            .set(handle.guess_path(user, "correct"), guess.correct);
    }

    match continuation {
        Continuation::Continue => {
            effect.batch.set(
                handle.current_path("state"),
                state_value(&RoundState::Group),
            );
        }
        Continuation::Backfill(count) => {
            if let [single] = incorrect.as_slice() {
                if let Some(guess) = guesses.get_mut(single).filter(|g| g.group.is_empty()) {
                    guess.group = "Group 0".to_string();
                    effect
                        .batch
                        .set(handle.guess_path(single, "group"), "Group 0");
                }
            }
            start_reading(handle, &mut effect, &guesses, count, ctx)?;
        }
        Continuation::Terminate => {
            interrupt(handle, &mut effect, round, &guesses, &correct, MARK_INTERRUPTION, ctx)?;
        }
    }

    Ok(effect)
}

fn submit_groups<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    groups: &BTreeMap<String, String>,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let round = handle.require_dasher(actor)?;

    let expected: BTreeSet<&String> = round.incorrect_guessers().collect();
    let submitted: BTreeSet<&String> = groups.keys().collect();
    if expected != submitted {
        return Err(TransitionError::Validation(
            "every incorrect guess must be grouped exactly once".into(),
        ));
    }

    let mut guesses = round.guesses.clone();
    let mut effect = Effect::to(Phase::Round(RoundState::Read));
    for (user, label) in groups {
        let label = label.trim();
        if label.is_empty() || label == TRUE_RESPONSE {
            return Err(TransitionError::Validation(format!(
                "invalid group label for {user}"
            )));
        }
        if let Some(guess) = guesses.get_mut(user) {
            guess.group = label.to_string();
        }
        effect.batch.set(handle.guess_path(user, "group"), label);
    }

    let diversity = groups
        .values()
        .map(|label| label.trim())
        .collect::<BTreeSet<_>>()
        .len();
    let correct: BTreeSet<String> = round.correct_guessers().cloned().collect();

    let incorrect: Vec<String> = round.incorrect_guessers().cloned().collect();
    let voters = count_voters(handle, &incorrect);
    match interruption::decide(diversity, voters, handle.session().ais) {
        Continuation::Continue => start_reading(handle, &mut effect, &guesses, 0, ctx)?,
        Continuation::Backfill(count) => start_reading(handle, &mut effect, &guesses, count, ctx)?,
        Continuation::Terminate => {
            interrupt(handle, &mut effect, round, &guesses, &correct, GROUP_INTERRUPTION, ctx)?;
        }
    }

    Ok(effect)
}

/// Wrong guessers still in the game; they are the only ones allowed to vote.
fn count_voters(handle: &SessionHandle, incorrect: &[String]) -> usize {
    let guessers = handle.guessers();
    incorrect.iter().filter(|user| guessers.contains(user)).count()
}

/// Inject synthetic decoys, shuffle the read-out order and enter READ.
fn start_reading<R: Rng + ?Sized>(
    handle: &SessionHandle,
    effect: &mut Effect,
    guesses: &BTreeMap<String, Guess>,
    ai_count: u32,
    ctx: &mut PlanContext<'_, R>,
) -> Result<(), TransitionError> {
    let decoys = interruption::synthesize_decoys(ai_count, guesses, ctx.decoys, ctx.rng);
    for (key, decoy) in &decoys {
        effect
            .batch
            .set_serialized(handle.guess_path(key, ""), decoy)?;
    }

    let mut order: Vec<String> = guesses
        .values()
        .chain(decoys.values())
        .filter(|guess| !guess.correct && !guess.group.is_empty())
        .map(|guess| guess.group.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    order.push(TRUE_RESPONSE.to_string());
    order.shuffle(ctx.rng);

    effect.to = Phase::Round(RoundState::Read);
    effect
        .batch
        .set_serialized(handle.current_path("read"), &ReadOut { order, index: -1 })?
        .set(handle.current_path("state"), state_value(&RoundState::Read));
    Ok(())
}

/// Short-circuit to TALLY with correctness-only scoring.
fn interrupt<R: Rng + ?Sized>(
    handle: &SessionHandle,
    effect: &mut Effect,
    round: &Round,
    guesses: &BTreeMap<String, Guess>,
    correct: &BTreeSet<String>,
    reason: &str,
    ctx: &mut PlanContext<'_, R>,
) -> Result<(), TransitionError> {
    let scores = ctx.scoring.score(
        &round.dasher,
        &BTreeMap::new(),
        guesses,
        correct,
        &handle.session().scoreboard,
    );

    effect.to = Phase::Round(RoundState::Tally);
    effect.preconditions.push(handle.unchanged("scoreboard"));
    effect
        .batch
        .set_serialized("scoreboard", &scores)?
        .set(handle.current_path("interruption"), reason)
        .set(handle.current_path("state"), state_value(&RoundState::Tally));
    Ok(())
}

fn read_next(handle: &SessionHandle, actor: &Actor) -> PlanResult {
    let round = handle.require_dasher(actor)?;
    let read = round.read.clone().unwrap_or_default();
    let next = read.index + 1;

    let mut effect = Effect::to(Phase::Round(RoundState::Read));
    effect
        .preconditions
        .push(handle.unchanged(handle.current_path("read/index")));

    if read.order.is_empty() || next >= read.order.len() as i64 {
        effect.to = Phase::Round(RoundState::Vote);
        effect.batch.set(
            handle.current_path("state"),
            state_value(&RoundState::Vote),
        );
    } else {
        effect.batch.set(handle.current_path("read/index"), next);
    }
    Ok(effect)
}

fn read_skip(handle: &SessionHandle, actor: &Actor) -> PlanResult {
    handle.require_dasher(actor)?;
    let mut effect = Effect::to(Phase::Round(RoundState::Vote));
    effect.batch.set(
        handle.current_path("state"),
        state_value(&RoundState::Vote),
    );
    Ok(effect)
}

/// Check one ballot: the voter guessed wrong and picks a label that is not their own.
fn check_vote(
    handle: &SessionHandle,
    round: &Round,
    voter: &str,
    label: &str,
) -> Result<(), TransitionError> {
    if voter == round.dasher || !handle.guessers().iter().any(|user| user == voter) {
        return Err(TransitionError::RoleViolation(format!(
            "{voter} cannot vote this round"
        )));
    }
    if round.guesses.get(voter).is_some_and(|guess| guess.correct) {
        return Err(TransitionError::RoleViolation(format!(
            "{voter} already found the true response"
        )));
    }

    let on_order = round
        .read
        .as_ref()
        .is_some_and(|read| read.order.iter().any(|entry| entry == label));
    if !on_order {
        return Err(TransitionError::Validation(format!(
            "`{label}` is not one of the read-out responses"
        )));
    }
    if round.label_of(voter) == Some(label) {
        return Err(TransitionError::Validation(
            "you cannot vote for your own response".into(),
        ));
    }
    Ok(())
}

fn submit_vote(handle: &SessionHandle, actor: &Actor, label: &str) -> PlanResult {
    let round = handle.active_round()?;
    check_vote(handle, round, &actor.username, label)?;

    let mut effect = Effect::to(Phase::Round(RoundState::Vote));
    effect
        .batch
        .set(handle.current_path(&format!("votes/{}", actor.username)), label);
    Ok(effect)
}

fn reveal<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    submitted: Option<BTreeMap<String, String>>,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    let round = handle.require_dasher(actor)?;

    let mut effect = Effect::to(Phase::Round(RoundState::Tally));
    let votes = match submitted {
        Some(votes) => {
            for (voter, label) in &votes {
                check_vote(handle, round, voter, label)?;
            }
            effect
                .batch
                .set_serialized(handle.current_path("votes"), &votes)?;
            votes
        }
        None => {
            effect
                .preconditions
                .push(handle.unchanged(handle.current_path("votes")));
            round.votes.clone()
        }
    };

    let correct: BTreeSet<String> = round.correct_guessers().cloned().collect();
    let scores = ctx.scoring.score(
        &round.dasher,
        &votes,
        &round.guesses,
        &correct,
        &handle.session().scoreboard,
    );

    effect.preconditions.push(handle.unchanged("scoreboard"));
    effect
        .batch
        .set_serialized("scoreboard", &scores)?
        .set(handle.current_path("state"), state_value(&RoundState::Tally));
    Ok(effect)
}

fn proceed<R: Rng + ?Sized>(
    handle: &SessionHandle,
    actor: &Actor,
    ctx: &mut PlanContext<'_, R>,
) -> PlanResult {
    handle.require_dasher(actor)?;
    let session = handle.session();

    if session.current >= session.limit {
        let mut effect = Effect::to(Phase::Finished);
        effect
            .batch
            .set("state", state_value(&SessionState::Finished));
        return Ok(effect);
    }

    let history = handle.dasher_history(session.current);
    let dasher = next_dasher(&history, &handle.players(), &BTreeSet::new(), ctx.rng)
        .ok_or_else(|| TransitionError::Validation("no player can dash".into()))?;
    let round = Round::seeded(dasher, pick_category(handle, ctx), ctx.rules.default_timer);

    let mut effect = Effect::to(Phase::Round(RoundState::Select));
    effect
        .preconditions
        .push(handle.unchanged(handle.next_round_path()));
    effect
        .batch
        .increment("current", 1)
        .set_serialized(handle.next_round_path(), &round)?;
    Ok(effect)
}

/// Category for a freshly seeded round.
fn pick_category<R: Rng + ?Sized>(handle: &SessionHandle, ctx: &mut PlanContext<'_, R>) -> String {
    handle
        .session()
        .categories
        .choose(ctx.rng)
        .cloned()
        .or_else(|| handle.round().map(|round| round.category.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::batch::{WriteValue, apply_batch, check_preconditions};
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::{Value, json};

    struct Harness {
        rules: GameRules,
        scoring: ScoringPolicy,
        decoys: Vec<String>,
        rng: StdRng,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                rules: GameRules::default(),
                scoring: ScoringPolicy::default(),
                decoys: vec!["A small boat.".into(), "A kind of cheese.".into()],
                rng: StdRng::seed_from_u64(42),
            }
        }

        fn plan(&mut self, doc: &Value, user: &str, event: GameEvent) -> Result<Plan, TransitionError> {
            let handle = SessionHandle::from_document("ABCD", doc.clone()).unwrap();
            let mut ctx = PlanContext {
                rules: &self.rules,
                scoring: &self.scoring,
                decoys: &self.decoys,
                rng: &mut self.rng,
            };
            plan(&handle, &Actor::new(user, None), event, &mut ctx)
        }

        /// Plan and commit against `doc`, like a store would.
        fn apply(&mut self, doc: &mut Value, user: &str, event: GameEvent) -> Phase {
            let plan = self.plan(doc, user, event).unwrap();
            check_preconditions(doc, &plan.preconditions).unwrap();
            apply_batch(doc, &plan.batch, 1_000).unwrap();
            plan.to
        }
    }

    fn session(round: Value) -> Value {
        json!({
            "state": "STARTED",
            "current": 1,
            "limit": 4,
            "ais": 0,
            "scoreboard": {"P1": 0, "P2": 0, "P3": 0},
            "categories": ["Laws"],
            "rounds": {"1": round}
        })
    }

    fn guess(response: &str) -> Value {
        json!({"response": response, "group": "", "correct": false, "automatic": false})
    }

    #[test]
    fn table_rejects_events_out_of_order() {
        assert!(allowed_targets(Phase::Round(RoundState::Select), EventKind::SubmitVote).is_err());
        assert!(allowed_targets(Phase::Finished, EventKind::Proceed).is_err());
        assert_eq!(
            allowed_targets(Phase::Round(RoundState::Read), EventKind::ReadSkip).unwrap(),
            &[Phase::Round(RoundState::Vote)]
        );

        let mut h = Harness::new();
        let doc = session(json!({"state": "SELECT", "dasher": "P1"}));
        let err = h.plan(&doc, "P1", GameEvent::ReadNext).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));
    }

    #[test]
    fn full_round_walks_every_stage() {
        let mut h = Harness::new();
        let mut doc = session(json!({"state": "SELECT", "dasher": "P1", "timer": 60}));

        let prompt = PromptSubmission {
            category: "Laws".into(),
            prompt: "Bumbershoot".into(),
            response: "An umbrella".into(),
            custom: false,
        };
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitPrompt(prompt)),
            Phase::Round(RoundState::Guess)
        );
        h.apply(&mut doc, "P2", GameEvent::SubmitGuess { text: "a kind of hat".into() });
        h.apply(&mut doc, "P3", GameEvent::SubmitGuess { text: "a  dance".into() });
        assert_eq!(doc["rounds"]["1"]["guesses"]["P2"]["response"], json!("A kind of hat."));

        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::CloseGuessing),
            Phase::Round(RoundState::Mark)
        );
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitMarks(BTreeMap::new())),
            Phase::Round(RoundState::Group)
        );

        let groups = BTreeMap::from([("P2".to_string(), "x".to_string()), ("P3".to_string(), "y".to_string())]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitGroups(groups)),
            Phase::Round(RoundState::Read)
        );

        for _ in 0..3 {
            assert_eq!(h.apply(&mut doc, "P1", GameEvent::ReadNext), Phase::Round(RoundState::Read));
        }
        assert_eq!(doc["rounds"]["1"]["read"]["index"], json!(2));
        assert_eq!(h.apply(&mut doc, "P1", GameEvent::ReadNext), Phase::Round(RoundState::Vote));

        h.apply(&mut doc, "P2", GameEvent::SubmitVote { label: "y".into() });
        h.apply(&mut doc, "P3", GameEvent::SubmitVote { label: TRUE_RESPONSE.into() });
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::Reveal { votes: None }),
            Phase::Round(RoundState::Tally)
        );

        assert_eq!(doc["scoreboard"], json!({"P1": 1, "P2": 0, "P3": 3}));
        assert_eq!(doc["updatedAt"], json!(1_000));
    }

    #[test]
    fn non_dasher_cannot_group() {
        let mut h = Harness::new();
        let doc = session(json!({
            "state": "GROUP",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));
        let groups = BTreeMap::from([("P2".to_string(), "x".to_string()), ("P3".to_string(), "y".to_string())]);

        let err = h.plan(&doc, "P2", GameEvent::SubmitGroups(groups)).unwrap_err();
        assert!(matches!(err, TransitionError::RoleViolation(_)));
    }

    #[test]
    fn groups_must_cover_incorrect_guessers() {
        let mut h = Harness::new();
        let doc = session(json!({
            "state": "GROUP",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));

        let partial = BTreeMap::from([("P2".to_string(), "x".to_string())]);
        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::SubmitGroups(partial)),
            Err(TransitionError::Validation(_))
        ));

        let sentinel = BTreeMap::from([
            ("P2".to_string(), TRUE_RESPONSE.to_string()),
            ("P3".to_string(), "y".to_string()),
        ]);
        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::SubmitGroups(sentinel)),
            Err(TransitionError::Validation(_))
        ));
    }

    #[test]
    fn marks_with_one_wrong_answer_backfill_when_budget_allows() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "MARK",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));
        doc["ais"] = json!(2);

        let marks = BTreeMap::from([("P3".to_string(), true)]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitMarks(marks)),
            Phase::Round(RoundState::Read)
        );

        let round = &doc["rounds"]["1"];
        assert_eq!(round["guesses"]["P2"]["group"], json!("Group 0"));
        let automatic = round["guesses"]
            .as_object()
            .unwrap()
            .values()
            .filter(|g| g["automatic"] == json!(true))
            .count();
        assert_eq!(automatic, 2);
        assert_eq!(round["read"]["order"].as_array().unwrap().len(), 4);
        assert_eq!(round["read"]["index"], json!(-1));
    }

    #[test]
    fn marks_without_wrong_answers_terminate() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "MARK",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));

        let marks = BTreeMap::from([("P2".to_string(), true), ("P3".to_string(), true)]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitMarks(marks)),
            Phase::Round(RoundState::Tally)
        );
        assert_eq!(doc["rounds"]["1"]["interruption"], json!(MARK_INTERRUPTION));
        assert_eq!(doc["scoreboard"], json!({"P1": 0, "P2": 2, "P3": 2}));
    }

    #[test]
    fn marks_reject_unknown_users_and_pin_guesses() {
        let mut h = Harness::new();
        let doc = session(json!({
            "state": "MARK",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));

        let marks = BTreeMap::from([("Zed".to_string(), true)]);
        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::SubmitMarks(marks)),
            Err(TransitionError::Validation(_))
        ));

        let plan = h.plan(&doc, "P1", GameEvent::SubmitMarks(BTreeMap::new())).unwrap();
        assert!(plan.preconditions.iter().any(|p| p.path == "rounds/1/guesses"));
        assert_eq!(
            plan.batch.get("rounds/1/state"),
            Some(&WriteValue::Set(json!("GROUP")))
        );
    }

    #[test]
    fn votes_are_checked_against_the_read_out() {
        let mut h = Harness::new();
        let doc = session(json!({
            "state": "VOTE",
            "dasher": "P1",
            "guesses": {
                "P2": {"response": "A.", "group": "x", "correct": false},
                "P3": {"response": "B.", "group": "", "correct": true}
            },
            "read": {"order": ["x", "TRUE_RESPONSE"], "index": 1}
        }));

        let own = h.plan(&doc, "P2", GameEvent::SubmitVote { label: "x".into() });
        assert!(matches!(own, Err(TransitionError::Validation(_))));
        let unknown = h.plan(&doc, "P2", GameEvent::SubmitVote { label: "zzz".into() });
        assert!(matches!(unknown, Err(TransitionError::Validation(_))));
        let correct = h.plan(&doc, "P3", GameEvent::SubmitVote { label: "x".into() });
        assert!(matches!(correct, Err(TransitionError::RoleViolation(_))));
        assert!(h.plan(&doc, "P2", GameEvent::SubmitVote { label: TRUE_RESPONSE.into() }).is_ok());
    }

    #[test]
    fn launch_requires_the_host_player_and_enough_players() {
        let mut h = Harness::new();
        let mut doc = json!({
            "state": "INITIATED",
            "current": 1,
            "limit": 4,
            "hostPlayer": "P1",
            "scoreboard": {"P1": 0, "P2": 0, "P3": 0},
            "clientTypes": {"P1": "PLAYER"},
            "categories": ["Laws"]
        });

        assert!(matches!(
            h.plan(&doc, "P2", GameEvent::Launch),
            Err(TransitionError::RoleViolation(_))
        ));
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::Launch),
            Phase::Round(RoundState::Select)
        );
        assert_eq!(doc["state"], json!("STARTED"));
        assert_eq!(doc["rounds"]["1"]["state"], json!("SELECT"));

        let mut small = json!({
            "state": "INITIATED",
            "current": 1,
            "hostPlayer": "P1",
            "scoreboard": {"P1": 0, "P2": 0}
        });
        assert!(matches!(
            h.plan(&small, "P1", GameEvent::Launch),
            Err(TransitionError::Validation(_))
        ));
        small["clientTypes"] = json!({"P1": "HOST"});
        assert!(matches!(
            h.plan(&small, "P1", GameEvent::Launch),
            Err(TransitionError::RoleViolation(_))
        ));
    }

    #[test]
    fn kick_reseeds_the_round_without_the_kicked_player() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "GUESS",
            "dasher": "P3",
            "guesses": {"P2": guess("A.")}
        }));

        assert_eq!(
            h.apply(&mut doc, "P2", GameEvent::Kick { target: "P3".into() }),
            Phase::Round(RoundState::Select)
        );
        assert_eq!(doc["kicked"]["P3"], json!("P2"));
        assert!(doc["scoreboard"].get("P3").is_none());
        let round = &doc["rounds"]["1"];
        assert_eq!(round["state"], json!("SELECT"));
        assert_ne!(round["dasher"], json!("P3"));
        assert_eq!(round["guesses"], json!({}));

        let again = h.plan(&doc, "P3", GameEvent::SubmitGuess { text: "hi".into() });
        assert!(matches!(again, Err(TransitionError::RoleViolation(_))));
    }

    #[test]
    fn marks_with_every_guess_correct_terminate_despite_ai_budget() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "MARK",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")}
        }));
        doc["ais"] = json!(2);

        let marks = BTreeMap::from([("P2".to_string(), true), ("P3".to_string(), true)]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitMarks(marks)),
            Phase::Round(RoundState::Tally)
        );
        let round = &doc["rounds"]["1"];
        assert_eq!(round["interruption"], json!(MARK_INTERRUPTION));
        assert!(round.get("read").is_none());
        assert_eq!(round["guesses"].as_object().unwrap().len(), 2);
        assert_eq!(doc["scoreboard"], json!({"P1": 0, "P2": 2, "P3": 2}));
    }

    #[test]
    fn single_group_with_ai_budget_backfills_into_the_read_out() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "GROUP",
            "dasher": "P1",
            "guesses": {"P2": guess("A hat."), "P3": guess("A cap.")}
        }));
        doc["ais"] = json!(2);

        let groups = BTreeMap::from([("P2".to_string(), "x".to_string()), ("P3".to_string(), "x".to_string())]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::SubmitGroups(groups)),
            Phase::Round(RoundState::Read)
        );

        let round = &doc["rounds"]["1"];
        let automatic: Vec<&Value> = round["guesses"]
            .as_object()
            .unwrap()
            .values()
            .filter(|g| g["automatic"] == json!(true))
            .collect();
        assert_eq!(automatic.len(), 2);

        let mut order: Vec<String> = serde_json::from_value(round["read"]["order"].clone()).unwrap();
        order.sort();
        assert_eq!(order, ["AI 1", "AI 2", TRUE_RESPONSE, "x"]);
        assert_eq!(round["read"]["index"], json!(-1));
        assert!(round.get("interruption").is_none_or(|i| i.as_str() == Some("")));
    }

    #[test]
    fn read_skip_opens_voting_for_the_dasher_only() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "READ",
            "dasher": "P1",
            "guesses": {
                "P2": {"response": "A.", "group": "x", "correct": false},
                "P3": {"response": "B.", "group": "y", "correct": false}
            },
            "read": {"order": ["x", "TRUE_RESPONSE", "y"], "index": 0}
        }));

        assert!(matches!(
            h.plan(&doc, "P2", GameEvent::ReadSkip),
            Err(TransitionError::RoleViolation(_))
        ));
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::ReadSkip),
            Phase::Round(RoundState::Vote)
        );
        assert_eq!(doc["rounds"]["1"]["state"], json!("VOTE"));
        assert_eq!(doc["rounds"]["1"]["read"]["index"], json!(0));
    }

    #[test]
    fn reveal_scores_the_aggregated_ballots() {
        let mut h = Harness::new();
        let mut doc = session(json!({
            "state": "VOTE",
            "dasher": "P1",
            "guesses": {
                "P2": {"response": "A.", "group": "x", "correct": false},
                "P3": {"response": "B.", "group": "y", "correct": false},
                "P4": {"response": "C.", "group": "", "correct": true}
            },
            "read": {"order": ["x", "TRUE_RESPONSE", "y"], "index": 2}
        }));
        doc["scoreboard"] = json!({"P1": 0, "P2": 0, "P3": 0, "P4": 0});

        let correct_voter = BTreeMap::from([("P4".to_string(), "x".to_string())]);
        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::Reveal { votes: Some(correct_voter) }),
            Err(TransitionError::RoleViolation(_))
        ));
        let own_label = BTreeMap::from([("P2".to_string(), "x".to_string())]);
        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::Reveal { votes: Some(own_label) }),
            Err(TransitionError::Validation(_))
        ));

        let ballots = BTreeMap::from([
            ("P2".to_string(), "y".to_string()),
            ("P3".to_string(), TRUE_RESPONSE.to_string()),
        ]);
        assert_eq!(
            h.apply(&mut doc, "P1", GameEvent::Reveal { votes: Some(ballots) }),
            Phase::Round(RoundState::Tally)
        );
        assert_eq!(
            doc["rounds"]["1"]["votes"],
            json!({"P2": "y", "P3": TRUE_RESPONSE})
        );
        assert_eq!(doc["scoreboard"], json!({"P1": 1, "P2": 0, "P3": 3, "P4": 2}));
    }

    #[test]
    fn launch_rejects_a_round_limit_outside_the_rules() {
        let mut h = Harness::new();
        let doc = json!({
            "state": "INITIATED",
            "current": 1,
            "limit": 20,
            "hostPlayer": "P1",
            "scoreboard": {"P1": 0, "P2": 0, "P3": 0},
            "categories": ["Laws"]
        });

        assert!(matches!(
            h.plan(&doc, "P1", GameEvent::Launch),
            Err(TransitionError::Validation(_))
        ));
    }

    #[test]
    fn kick_during_tally_keeps_the_scored_round() {
        let mut h = Harness::new();
        let tally = json!({
            "state": "TALLY",
            "dasher": "P1",
            "guesses": {"P2": guess("A."), "P3": guess("B.")},
            "votes": {"P2": "y"}
        });

        let mut doc = session(tally.clone());
        assert_eq!(
            h.apply(&mut doc, "P2", GameEvent::Kick { target: "P3".into() }),
            Phase::Round(RoundState::Tally)
        );
        assert_eq!(doc["rounds"]["1"], tally);
        assert!(doc["scoreboard"].get("P3").is_none());

        let mut doc = session(tally.clone());
        h.apply(&mut doc, "P2", GameEvent::Kick { target: "P1".into() });
        let round = &doc["rounds"]["1"];
        assert_eq!(round["state"], json!("TALLY"));
        assert_ne!(round["dasher"], json!("P1"));
        assert_eq!(round["guesses"], tally["guesses"]);
        assert_eq!(round["votes"], tally["votes"]);
    }
}
