//! Session façade: one fetched snapshot plus the paths and guards derived from it.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    dao::{
        batch::{Precondition, lookup},
        storage::StorageError,
    },
    state::{
        session::{ClientType, Round, RoundState, Session, SessionState},
        state_machine::TransitionError,
    },
};

/// Authenticated identity performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Username from the identity layer.
    pub username: String,
    /// Device the request came from, when known.
    pub device_id: Option<String>,
}

impl Actor {
    /// Identity for `username`, optionally bound to a device.
    pub fn new(username: impl Into<String>, device_id: Option<String>) -> Self {
        Self {
            username: username.into(),
            device_id,
        }
    }
}

/// Snapshot of one session as read at the start of an action.
///
/// The raw document is kept next to the decoded session so preconditions can
/// pin subtrees exactly as the store holds them.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    session: Session,
    document: Value,
}

impl SessionHandle {
    /// Decode a raw store document.
    pub fn from_document(id: &str, document: Value) -> Result<Self, StorageError> {
        let session = Session::deserialize(&document).map_err(|source| {
            StorageError::Corrupted {
                id: id.to_string(),
                source,
            }
        })?;
        Ok(Self {
            id: id.to_string(),
            session,
            document,
        })
    }

    /// Stored value at `path`, `Null` when absent.
    pub fn stored(&self, path: &str) -> Value {
        lookup(&self.document, path).cloned().unwrap_or(Value::Null)
    }

    /// Precondition pinning `path` to its value in this snapshot.
    pub fn unchanged(&self, path: impl Into<String>) -> Precondition {
        let path = path.into();
        let expected = self.stored(&path);
        Precondition { path, expected }
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Decoded session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of the current round.
    pub fn current(&self) -> u32 {
        self.session.current
    }

    /// Round being played, if the counter points at a stored round.
    pub fn round(&self) -> Option<&Round> {
        self.session.rounds.get(&self.session.current)
    }

    /// Path of round `n`.
    pub fn round_path(n: u32) -> String {
        format!("rounds/{n}")
    }

    /// Path of the current round, or of a field inside it.
    pub fn current_path(&self, field: &str) -> String {
        join(&Self::round_path(self.session.current), field)
    }

    /// Path of the round that follows the current one.
    pub fn next_round_path(&self) -> String {
        Self::round_path(self.session.current + 1)
    }

    /// Path of a field of `user`'s guess in the current round.
    pub fn guess_path(&self, user: &str, field: &str) -> String {
        join(&self.current_path(&format!("guesses/{user}")), field)
    }

    /// Usernames taking part in rounds: scoreboard entries that are neither
    /// display hosts, spectators nor kicked.
    pub fn players(&self) -> Vec<String> {
        self.session
            .scoreboard
            .keys()
            .filter(|user| {
                !matches!(
                    self.session.client_types.get(*user),
                    Some(ClientType::Host | ClientType::Spectator)
                )
            })
            .filter(|user| !self.session.kicked.contains_key(*user))
            .cloned()
            .collect()
    }

    /// Players other than the current dasher.
    pub fn guessers(&self) -> Vec<String> {
        let dasher = self.round().map(|round| round.dasher.as_str());
        self.players()
            .into_iter()
            .filter(|user| Some(user.as_str()) != dasher)
            .collect()
    }

    /// Dashers of rounds `1..=upto`, in round order.
    pub fn dasher_history(&self, upto: u32) -> Vec<String> {
        self.session
            .rounds
            .range(..=upto)
            .map(|(_, round)| round.dasher.clone())
            .filter(|dasher| !dasher.is_empty())
            .collect()
    }

    /// Reject kicked users and devices not bound to the session.
    pub fn authorize(&self, actor: &Actor) -> Result<(), TransitionError> {
        if self.session.kicked.contains_key(&actor.username) {
            return Err(TransitionError::RoleViolation(format!(
                "{} was removed from this session",
                actor.username
            )));
        }

        if !self.session.uids.is_empty() {
            let bound = actor
                .device_id
                .as_ref()
                .is_some_and(|device| self.session.uids.get(device).copied().unwrap_or(false));
            if !bound {
                return Err(TransitionError::RoleViolation(
                    "device is not bound to this session".into(),
                ));
            }
        }

        Ok(())
    }

    /// Current round while the game is running.
    pub fn active_round(&self) -> Result<&Round, TransitionError> {
        if self.session.state != SessionState::Started {
            return Err(TransitionError::Stale(format!(
                "session is {:?}, not started",
                self.session.state
            )));
        }
        self.round().ok_or_else(|| {
            TransitionError::Stale(format!("round {} does not exist", self.session.current))
        })
    }

    /// Capability check shared by every dasher-paced transition.
    pub fn require_dasher(&self, actor: &Actor) -> Result<&Round, TransitionError> {
        let round = self.active_round()?;
        if round.dasher != actor.username {
            return Err(TransitionError::RoleViolation(format!(
                "only the dasher {} can do this",
                round.dasher
            )));
        }
        Ok(round)
    }

    /// Conditions every round transition commits under.
    pub fn round_preconditions(&self, expected: RoundState) -> Vec<Precondition> {
        vec![
            Precondition::new("state", state_value(&self.session.state)),
            Precondition::new("current", self.session.current),
            Precondition::new(self.current_path("state"), state_value(&expected)),
        ]
    }
}

fn join(base: &str, field: &str) -> String {
    if field.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{field}")
    }
}

/// Wire string of an enum as stored in the document.
pub fn state_value<T: serde::Serialize>(state: &T) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}
