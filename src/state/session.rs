//! Session document shapes shared by the store, the state machine and clients.
//!
//! Field names and enum strings are stable: they are what the presentation
//! layer reads from the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Read-out label standing for the dasher's true response.
pub const TRUE_RESPONSE: &str = "TRUE_RESPONSE";

/// Lifecycle of a whole game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Players are gathering in the lobby.
    #[default]
    Initiated,
    /// Rounds are being played.
    Started,
    /// The round limit was reached.
    Finished,
}

/// Stage of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundState {
    /// The dasher picks a prompt.
    #[default]
    Select,
    /// Players write their guesses.
    Guess,
    /// The dasher marks correct guesses.
    Mark,
    /// The dasher clusters wrong guesses into decoys.
    Group,
    /// Decoys and the true response are read aloud.
    Read,
    /// Players vote for the response they believe.
    Vote,
    /// Scores are displayed.
    Tally,
}

/// Kind of client attached to a username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientType {
    /// Regular participant.
    #[default]
    Player,
    /// Shared display screen; never plays.
    Host,
    /// Watches without playing.
    Spectator,
}

/// One game instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    /// Lifecycle of the whole session.
    pub state: SessionState,
    /// 1-based round counter.
    pub current: u32,
    /// Total number of rounds.
    pub limit: u32,
    /// Points per participant; keys also list who is in the session.
    pub scoreboard: BTreeMap<String, i64>,
    /// Rounds keyed by number, never deleted.
    pub rounds: BTreeMap<u32, Round>,
    /// Removed usernames mapped to the player who removed them.
    pub kicked: BTreeMap<String, String>,
    /// Device identifiers bound to the session.
    pub uids: BTreeMap<String, bool>,
    /// Kind of client each participant uses.
    pub client_types: BTreeMap<String, ClientType>,
    /// Synthetic decoys injected when wrong answers lack diversity.
    pub ais: u32,
    /// Player allowed to launch the game.
    pub host_player: Option<String>,
    /// Categories rounds are drawn from.
    pub categories: Vec<String>,
    /// Unix milliseconds of the last committed transition.
    pub updated_at: Option<i64>,
}

/// One round of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Round {
    /// Stage of the round.
    pub state: RoundState,
    /// Player running the round.
    pub dasher: String,
    /// Prompt category.
    pub category: String,
    /// Word or phrase to define.
    pub prompt: String,
    /// The true answer.
    pub response: String,
    /// Whether the dasher wrote the prompt themselves.
    pub custom: bool,
    /// Guessing time in seconds.
    pub timer: u32,
    /// Guesses keyed by author, synthetic ones included.
    pub guesses: BTreeMap<String, Guess>,
    /// Read-out progress, present from READ on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<ReadOut>,
    /// Label each voter picked.
    pub votes: BTreeMap<String, String>,
    /// Reason the round short-circuited, empty otherwise.
    pub interruption: String,
}

/// A response written by a player or injected as a synthetic decoy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Guess {
    /// Normalized guess text.
    pub response: String,
    /// Decoy label assigned while grouping.
    pub group: String,
    /// Marked as matching the true response.
    pub correct: bool,
    /// Set on synthetic decoys.
    pub automatic: bool,
}

/// Read-out order and cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ReadOut {
    /// Labels in reading order, `TRUE_RESPONSE` included.
    pub order: Vec<String>,
    /// Position of the card being read, -1 before the first one.
    pub index: i64,
}

impl Round {
    /// Fresh round waiting for its dasher to pick a prompt.
    pub fn seeded(dasher: impl Into<String>, category: impl Into<String>, timer: u32) -> Self {
        Self {
            state: RoundState::Select,
            dasher: dasher.into(),
            category: category.into(),
            timer,
            ..Self::default()
        }
    }

    /// Usernames whose human guess was marked wrong.
    pub fn incorrect_guessers(&self) -> impl Iterator<Item = &String> {
        self.guesses
            .iter()
            .filter(|(_, guess)| !guess.correct && !guess.automatic)
            .map(|(user, _)| user)
    }

    /// Usernames whose guess was marked correct.
    pub fn correct_guessers(&self) -> impl Iterator<Item = &String> {
        self.guesses
            .iter()
            .filter(|(_, guess)| guess.correct)
            .map(|(user, _)| user)
    }

    /// Decoy label authored by `user`, if any.
    pub fn label_of(&self, user: &str) -> Option<&str> {
        self.guesses
            .get(user)
            .filter(|guess| !guess.correct && !guess.group.is_empty())
            .map(|guess| guess.group.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_round_trips_store_shape() {
        let raw = json!({
            "state": "STARTED",
            "current": 1,
            "limit": 4,
            "scoreboard": {"P1": 0, "P2": 3},
            "clientTypes": {"TV": "HOST"},
            "hostPlayer": "P1",
            "rounds": {
                "1": {
                    "state": "GROUP",
                    "dasher": "P1",
                    "guesses": {"P2": {"response": "A fish.", "group": "x", "correct": false}},
                    "read": {"order": ["x", "TRUE_RESPONSE"], "index": -1}
                }
            }
        });

        let session: Session = serde_json::from_value(raw).unwrap();
        assert_eq!(session.state, SessionState::Started);
        assert_eq!(session.client_types["TV"], ClientType::Host);
        let round = &session.rounds[&1];
        assert_eq!(round.state, RoundState::Group);
        assert_eq!(round.read.as_ref().map(|r| r.index), Some(-1));
        assert!(!round.guesses["P2"].automatic);

        let encoded = serde_json::to_value(&session).unwrap();
        assert_eq!(encoded["rounds"]["1"]["state"], json!("GROUP"));
        assert_eq!(encoded["hostPlayer"], json!("P1"));
    }

    #[test]
    fn round_helpers_split_guessers() {
        let mut round = Round::seeded("P1", "Laws", 60);
        round.guesses.insert(
            "P2".into(),
            Guess {
                response: "A.".into(),
                group: "x".into(),
                ..Guess::default()
            },
        );
        round.guesses.insert(
            "P3".into(),
            Guess {
                correct: true,
                ..Guess::default()
            },
        );

        assert_eq!(round.incorrect_guessers().collect::<Vec<_>>(), ["P2"]);
        assert_eq!(round.correct_guessers().collect::<Vec<_>>(), ["P3"]);
        assert_eq!(round.label_of("P2"), Some("x"));
        assert_eq!(round.label_of("P3"), None);
    }
}
