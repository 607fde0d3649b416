//! Scoring engine converting the facts of one round into an updated scoreboard.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::session::{Guess, TRUE_RESPONSE};

/// Point values awarded at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Awarded to every player who wrote down the true response.
    pub correct_guess: i64,
    /// Awarded to every voter who picked the true response.
    pub true_vote: i64,
    /// Awarded to each author of a decoy, per vote that decoy received.
    pub decoy_vote: i64,
    /// Awarded to the dasher per vote landing on any decoy.
    pub dasher_fooled: i64,
    /// Added to the dasher when nobody was fooled by construction: every human
    /// guess was correct, or only one human guess was submitted.
    pub dasher_all_correct: i64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            correct_guess: 2,
            true_vote: 2,
            decoy_vote: 1,
            dasher_fooled: 1,
            dasher_all_correct: 0,
        }
    }
}

impl ScoringPolicy {
    /// Compute the scoreboard after one round.
    ///
    /// Pure: the result depends on the arguments only. Only players already on
    /// `scoreboard` gain points, so synthetic decoy authors and departed players
    /// are skipped and no existing entry ever disappears. Empty `votes` yields
    /// correctness-only scoring.
    pub fn score(
        &self,
        dasher: &str,
        votes: &BTreeMap<String, String>,
        guesses: &BTreeMap<String, Guess>,
        correct: &BTreeSet<String>,
        scoreboard: &BTreeMap<String, i64>,
    ) -> BTreeMap<String, i64> {
        let mut next = scoreboard.clone();
        let mut award = |user: &str, points: i64| {
            if let Some(score) = next.get_mut(user) {
                *score += points;
            }
        };

        for user in correct.iter().filter(|user| user.as_str() != dasher) {
            award(user, self.correct_guess);
        }

        for (voter, label) in votes {
            if voter == dasher || !scoreboard.contains_key(voter) {
                continue;
            }

            if label == TRUE_RESPONSE {
                award(voter, self.true_vote);
                continue;
            }

            let authors: Vec<&String> = guesses
                .iter()
                .filter(|(_, guess)| !guess.correct && guess.group == *label)
                .map(|(author, _)| author)
                .collect();
            if authors.is_empty() || authors.contains(&voter) {
                continue;
            }

            for author in authors {
                award(author, self.decoy_vote);
            }
            award(dasher, self.dasher_fooled);
        }

        let human: Vec<&Guess> = guesses.values().filter(|guess| !guess.automatic).collect();
        let all_correct = human.iter().all(|guess| guess.correct) && !human.is_empty();
        if all_correct || human.len() == 1 {
            award(dasher, self.dasher_all_correct);
        }

        next
    }
}
