//! Early termination policy and synthetic decoy backfill.

use std::collections::BTreeMap;

use rand::{Rng, seq::SliceRandom};

use crate::state::session::{Guess, TRUE_RESPONSE};

/// Interruption recorded when marking leaves at most one wrong answer.
pub const MARK_INTERRUPTION: &str = "1 or fewer incorrect guesses were submitted";
/// Interruption recorded when grouping collapses every wrong answer into one label.
pub const GROUP_INTERRUPTION: &str = "There was only 1 distinct incorrect guess!";

/// Guess keys of synthetic entries start with a character usernames cannot hold.
pub const AI_KEY_PREFIX: &str = "~ai-";
const AI_LABEL_PREFIX: &str = "AI ";
const FALLBACK_DECOY: &str = "Something nobody saw coming.";

/// Outcome of the interruption policy for one screening step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Skip straight to the tally with correctness-only scoring.
    Terminate,
    /// Inject this many synthetic decoys and move on to the read-out.
    Backfill(u32),
    /// Enough wrong answers for a meaningful vote.
    Continue,
}

/// Decide how a round continues once wrong answers have been counted.
///
/// `diversity` counts distinct human wrong answers (or groups), `voters`
/// counts current players whose guess was wrong and who can therefore vote,
/// and `ai_count` is the session's synthetic decoy budget. A round nobody can
/// vote in always terminates.
pub fn decide(diversity: usize, voters: usize, ai_count: u32) -> Continuation {
    if voters == 0 {
        Continuation::Terminate
    } else if diversity > 1 {
        Continuation::Continue
    } else if ai_count == 0 {
        Continuation::Terminate
    } else {
        Continuation::Backfill(ai_count)
    }
}

/// Build `count` automatic guesses whose keys and labels never collide with
/// the entries already in `guesses` nor with the true-response sentinel.
///
/// Decoy texts are drawn from `pool` without repetition while it lasts.
pub fn synthesize_decoys<R: Rng + ?Sized>(
    count: u32,
    guesses: &BTreeMap<String, Guess>,
    pool: &[String],
    rng: &mut R,
) -> BTreeMap<String, Guess> {
    let mut texts: Vec<&String> = pool.iter().collect();
    texts.shuffle(rng);
    let mut texts = texts.into_iter();

    let mut decoys = BTreeMap::new();
    let mut serial = 0u32;
    while decoys.len() < count as usize {
        serial += 1;
        let key = format!("{AI_KEY_PREFIX}{serial}");
        let label = format!("{AI_LABEL_PREFIX}{serial}");
        let taken = guesses.contains_key(&key)
            || label == TRUE_RESPONSE
            || guesses.values().any(|guess| guess.group == label);
        if taken {
            continue;
        }

        let response = texts
            .next()
            .map(String::clone)
            .unwrap_or_else(|| FALLBACK_DECOY.to_string());
        decoys.insert(
            key,
            Guess {
                response,
                group: label,
                correct: false,
                automatic: true,
            },
        );
    }

    decoys
}
