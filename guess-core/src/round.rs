use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{City, CityId};

/// Wrong answers offered alongside the target.
pub const DISTRACTOR_COUNT: usize = 3;

/// What the player sees of the target city. Only the clues are revealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundTarget {
    pub id: CityId,
    pub clues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundOption {
    pub id: CityId,
    pub name: String,
}

impl From<&City> for RoundOption {
    fn from(city: &City) -> Self {
        Self {
            id: city.id.clone(),
            name: city.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub target: Option<RoundTarget>,
    pub options: Vec<RoundOption>,
}

impl Round {
    /// The user has solved every city in the catalog.
    pub fn unavailable() -> Self {
        Self {
            target: None,
            options: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.target.is_some()
    }
}

/// Builds the option set from the target and its distractors and shuffles it
/// uniformly. Distractors repeating the target or each other are dropped.
pub fn assemble_round<R: Rng + ?Sized>(target: &City, distractors: &[City], rng: &mut R) -> Round {
    let mut options: Vec<RoundOption> = Vec::with_capacity(distractors.len() + 1);
    options.push(RoundOption::from(target));
    for city in distractors {
        if !options.iter().any(|o| o.id == city.id) {
            options.push(RoundOption::from(city));
        }
    }
    options.shuffle(rng);

    Round {
        target: Some(RoundTarget {
            id: target.id.clone(),
            clues: target.clues.clone(),
        }),
        options,
    }
}
