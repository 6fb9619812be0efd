use serde::{Deserialize, Serialize};

use crate::{update_city_progress, City, User};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessOutcome {
    pub correct: bool,
    pub actual_city: String,
}

/// Exact match after case folding. No trimming or fuzzy matching.
pub fn guess_matches(guess: &str, city_name: &str) -> bool {
    guess.to_lowercase() == city_name.to_lowercase()
}

/// Scores a guess against `city` and records it on the user's ledger.
///
/// Every call is recorded as an attempt. The caller is responsible for
/// refreshing completion and persisting the user afterwards.
pub fn record_guess(user: &mut User, city: &City, guess: &str, now: u64) -> GuessOutcome {
    let correct = guess_matches(guess, &city.name);
    update_city_progress(user, &city.id, correct, now);

    let mut finished = false;
    if let Some(game) = user
        .current_game
        .as_mut()
        .filter(|game| game.city_id == city.id)
    {
        game.attempts = game.attempts.saturating_add(1);
        finished = correct;
    }
    if finished {
        user.clear_game();
    }

    GuessOutcome {
        correct,
        actual_city: city.name.clone(),
    }
}
