use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::CityId;

pub type UserId = String;

/// One user's record for one city.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEntry {
    pub city_id: CityId,
    pub attempts: u32,
    pub correct: bool,
    pub hints_used: Vec<String>,
    pub score: u32,
    pub last_attempt: u64,
}

impl ProgressEntry {
    pub fn status(&self) -> EntryStatus {
        if self.correct {
            EntryStatus::AttemptedCorrect
        } else {
            EntryStatus::AttemptedIncorrect
        }
    }
}

/// Lifecycle of a (user, city) pair. `AttemptedCorrect` is absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Unseen,
    AttemptedIncorrect,
    AttemptedCorrect,
}

/// The round a user is currently playing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentGame {
    pub city_id: CityId,
    pub attempts: u32,
    pub hints_used: Vec<String>,
    pub started_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub progress: HashMap<CityId, ProgressEntry>,
    pub current_game: Option<CurrentGame>,
    pub total_score: u32,
    pub completed_count: u32,
    pub completed_all_cities: bool,
    pub created_at: u64,
}

impl User {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            progress: HashMap::new(),
            current_game: None,
            total_score: 0,
            completed_count: 0,
            completed_all_cities: false,
            created_at: now,
        }
    }

    pub fn status_of(&self, city_id: &str) -> EntryStatus {
        self.progress
            .get(city_id)
            .map(ProgressEntry::status)
            .unwrap_or(EntryStatus::Unseen)
    }

    /// Cities this user has solved. These are never offered as a target again.
    pub fn answered_cities(&self) -> HashSet<CityId> {
        self.progress
            .values()
            .filter(|p| p.correct)
            .map(|p| p.city_id.clone())
            .collect()
    }

    pub fn correct_count(&self) -> usize {
        self.progress.values().filter(|p| p.correct).count()
    }

    pub fn incorrect_count(&self) -> usize {
        self.progress.values().filter(|p| !p.correct).count()
    }

    pub fn start_game(&mut self, city_id: impl Into<CityId>, now: u64) {
        self.current_game = Some(CurrentGame {
            city_id: city_id.into(),
            attempts: 0,
            hints_used: Vec::new(),
            started_at: now,
        });
    }

    pub fn clear_game(&mut self) {
        self.current_game = None;
    }
}

/// Records one attempt at `city_id`.
///
/// `correct` only ever escalates false -> true; a later wrong answer never
/// erases an earlier right one. Attempts count every call. Returns the
/// entry's status after the update.
pub fn update_city_progress(
    user: &mut User,
    city_id: &str,
    is_correct: bool,
    now: u64,
) -> EntryStatus {
    let entry = user
        .progress
        .entry(city_id.to_string())
        .or_insert_with(|| ProgressEntry {
            city_id: city_id.to_string(),
            attempts: 0,
            correct: false,
            hints_used: Vec::new(),
            score: 0,
            last_attempt: now,
        });

    entry.attempts = entry.attempts.saturating_add(1);
    entry.last_attempt = now;

    if is_correct && !entry.correct {
        entry.correct = true;
        entry.score = 1;
        user.total_score = user.total_score.saturating_add(1);
    }

    entry.status()
}

/// Recomputes the derived completion fields.
///
/// `completed_all_cities` is a write-once latch: it is set when the solved
/// count reaches `catalog_total` and only [`reset_progress`] clears it. An
/// empty catalog never completes.
pub fn refresh_completion(user: &mut User, catalog_total: usize) {
    let solved = user.correct_count();
    user.completed_count = u32::try_from(solved).unwrap_or(u32::MAX);

    if !user.completed_all_cities && catalog_total > 0 && solved == catalog_total {
        user.completed_all_cities = true;
    }
}

pub fn reset_progress(user: &mut User) {
    user.progress.clear();
    user.current_game = None;
    user.total_score = 0;
    user.completed_count = 0;
    user.completed_all_cities = false;
}
