use std::collections::HashSet;

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::GameError;

pub type CityId = String;

pub const DEFAULT_DIFFICULTY: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub country: String,
    pub clues: Vec<String>,
    pub fun_facts: Vec<String>,
    pub trivia: Vec<String>,
    pub difficulty: u8,
}

/// A catalog record as it appears in a seed file, before it has an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitySeed {
    pub name: String,
    pub country: String,
    pub clues: Vec<String>,
    #[serde(default)]
    pub fun_facts: Vec<String>,
    #[serde(default)]
    pub trivia: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
}

fn default_difficulty() -> u8 {
    DEFAULT_DIFFICULTY
}

impl CitySeed {
    pub fn into_city(self, id: impl Into<CityId>) -> Result<City, GameError> {
        if self.name.trim().is_empty() {
            return Err(GameError::MissingCityName);
        }
        if self.clues.is_empty() {
            return Err(GameError::MissingClues(self.name));
        }
        if !(1..=3).contains(&self.difficulty) {
            return Err(GameError::InvalidDifficulty(self.difficulty));
        }

        Ok(City {
            id: id.into(),
            name: self.name,
            country: self.country,
            clues: self.clues,
            fun_facts: self.fun_facts,
            trivia: self.trivia,
            difficulty: self.difficulty,
        })
    }
}

/// Draws one city uniformly from those not in `excluding`.
///
/// Returns `None` when every city is excluded; that is an exhausted
/// catalog, not a failure.
pub fn sample_one<'a, R: Rng + ?Sized>(
    cities: &'a [City],
    excluding: &HashSet<CityId>,
    rng: &mut R,
) -> Option<&'a City> {
    cities
        .iter()
        .filter(|c| !excluding.contains(&c.id))
        .choose(rng)
}

/// Draws up to `n` distinct cities uniformly from those not in `excluding`.
/// The order of the returned cities carries no meaning.
pub fn sample_many<'a, R: Rng + ?Sized>(
    cities: &'a [City],
    n: usize,
    excluding: &HashSet<CityId>,
    rng: &mut R,
) -> Vec<&'a City> {
    cities
        .iter()
        .filter(|c| !excluding.contains(&c.id))
        .choose_multiple(rng, n)
}
