//! Game rules for the city guessing game: the city catalog, per-user
//! progress ledger, round assembly and guess checking.
//!
//! Everything here is synchronous and storage-agnostic. Callers load
//! records, hand them to these functions, then persist the result.

mod city;
mod guess;
mod progress;
mod round;

use thiserror::Error;

pub use city::{sample_many, sample_one, City, CityId, CitySeed, DEFAULT_DIFFICULTY};
pub use guess::{guess_matches, record_guess, GuessOutcome};
pub use progress::{
    refresh_completion, reset_progress, update_city_progress, CurrentGame, EntryStatus,
    ProgressEntry, User, UserId,
};
pub use round::{assemble_round, Round, RoundOption, RoundTarget, DISTRACTOR_COUNT};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("city name required")]
    MissingCityName,
    #[error("city {0} has no clues")]
    MissingClues(String),
    #[error("difficulty {0} out of range 1..=3")]
    InvalidDifficulty(u8),
}
