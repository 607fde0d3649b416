//! Fair dasher rotation.

use std::collections::BTreeSet;

use rand::{Rng, seq::IndexedRandom};

/// Pick the dasher of the next round.
///
/// `history` lists past dashers in round order. Within a rotation cycle no
/// eligible player dashes twice; once everyone has gone the cycle restarts,
/// excluding the most recent dasher so nobody dashes back-to-back. Returns
/// `None` when no player is eligible.
pub fn next_dasher<R: Rng + ?Sized>(
    history: &[String],
    players: &[String],
    exclusions: &BTreeSet<String>,
    rng: &mut R,
) -> Option<String> {
    let eligible: BTreeSet<&String> = players
        .iter()
        .filter(|player| !exclusions.contains(*player))
        .collect();
    if eligible.is_empty() {
        return None;
    }

    let mut already: BTreeSet<&String> = BTreeSet::new();
    for dasher in history.iter().filter(|dasher| eligible.contains(dasher)) {
        if eligible.is_subset(&already) {
            already.clear();
        }
        already.insert(dasher);
    }

    let mut pool: Vec<&String> = eligible.difference(&already).copied().collect();
    if pool.is_empty() {
        pool = eligible
            .iter()
            .copied()
            .filter(|player| Some(*player) != history.last())
            .collect();
    }
    if pool.is_empty() {
        pool = eligible.into_iter().collect();
    }

    pool.choose(rng).map(|player| (*player).clone())
}
