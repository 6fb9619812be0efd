use std::collections::HashSet;
use std::sync::Arc;

use guess_core::{
    assemble_round, record_guess, refresh_completion, reset_progress, GuessOutcome, Round,
    User, DISTRACTOR_COUNT,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ServiceError;
use crate::now_millis;
use crate::store::{CityStore, StoreError, UserStore};

/// A user together with their correct/incorrect tallies.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub correct_score: usize,
    pub incorrect_score: usize,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            correct_score: user.correct_count(),
            incorrect_score: user.incorrect_count(),
            user,
        }
    }
}

pub struct GameService {
    users: Arc<dyn UserStore>,
    cities: Arc<dyn CityStore>,
    rng: Mutex<ChaCha8Rng>,
}

impl GameService {
    pub fn new(users: Arc<dyn UserStore>, cities: Arc<dyn CityStore>) -> Self {
        Self::with_rng(users, cities, ChaCha8Rng::from_entropy())
    }

    pub fn seeded(users: Arc<dyn UserStore>, cities: Arc<dyn CityStore>, seed: u64) -> Self {
        Self::with_rng(users, cities, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(users: Arc<dyn UserStore>, cities: Arc<dyn CityStore>, rng: ChaCha8Rng) -> Self {
        Self {
            users,
            cities,
            rng: Mutex::new(rng),
        }
    }

    /// Logs in as `name`, creating the user on first sight.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, name: &str) -> Result<User, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::MissingUsername);
        }

        if let Some(existing) = self.users.find_by_name(name).await? {
            return Ok(existing);
        }
        match self.users.create(name).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "user registered");
                Ok(user)
            }
            // Lost a race with another registration for the same name.
            Err(StoreError::NameTaken(_)) => self
                .users
                .find_by_name(name)
                .await?
                .ok_or(ServiceError::UserNotFound),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn profile(&self, user_id: &str) -> Result<Profile, ServiceError> {
        Ok(self.load_user(user_id).await?.into())
    }

    /// Picks an unsolved city for the caller and builds its option set.
    ///
    /// Returns [`Round::unavailable`] once every city has been solved.
    #[tracing::instrument(skip(self))]
    pub async fn next_round(&self, caller: Option<&str>) -> Result<Round, ServiceError> {
        let user_id = require_caller(caller)?;
        let user = self.load_user(user_id).await?;

        let answered = user.answered_cities();
        let Some(target) = self.cities.sample_one(&answered).await? else {
            tracing::info!(user_id, solved = answered.len(), "catalog exhausted");
            if user.current_game.is_some() {
                self.apply(user_id, &mut |u: &mut User| u.clear_game())
                    .await?;
            }
            return Ok(Round::unavailable());
        };

        let exclude_target = HashSet::from([target.id.clone()]);
        let distractors = self
            .cities
            .sample_many(DISTRACTOR_COUNT, &exclude_target)
            .await?;

        let round = {
            let mut rng = self.rng.lock().await;
            assemble_round(&target, &distractors, &mut *rng)
        };

        let now = now_millis();
        self.apply(user_id, &mut |u: &mut User| u.start_game(target.id.clone(), now))
            .await?;

        tracing::info!(user_id, city_id = %target.id, options = round.options.len(), "round served");
        Ok(round)
    }

    #[tracing::instrument(skip(self, guess))]
    pub async fn validate_guess(
        &self,
        caller: Option<&str>,
        city_id: &str,
        guess: &str,
    ) -> Result<GuessOutcome, ServiceError> {
        let user_id = require_caller(caller)?;
        let Some(city) = self.cities.find_by_id(city_id).await? else {
            tracing::warn!(user_id, city_id, "guess for unknown city");
            return Err(ServiceError::CityNotFound);
        };

        let now = now_millis();
        let mut outcome = None;
        let applied = self
            .apply(user_id, &mut |u: &mut User| {
                outcome = Some(record_guess(u, &city, guess, now));
            })
            .await;
        let user = match applied {
            Ok(user) => user,
            Err(ServiceError::UserNotFound) => return Err(ServiceError::CityNotFound),
            Err(err) => return Err(err),
        };
        let outcome = outcome.ok_or(ServiceError::CityNotFound)?;
        tracing::info!(
            user_id,
            city_id,
            correct = outcome.correct,
            completed_all = user.completed_all_cities,
            "guess recorded"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reset_progress(&self, caller: Option<&str>) -> Result<(), ServiceError> {
        let user_id = require_caller(caller)?;
        self.apply(user_id, &mut |u: &mut User| reset_progress(u))
            .await?;
        tracing::info!(user_id, "progress reset");
        Ok(())
    }

    async fn load_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.users.find_by_id(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id, "user not found");
            ServiceError::UserNotFound
        })
    }

    /// Every mutation of a user goes through here, so the completion fields
    /// are always derived from the ledger being stored.
    async fn apply(
        &self,
        user_id: &str,
        change: &mut (dyn FnMut(&mut User) + Send),
    ) -> Result<User, ServiceError> {
        let total = self.cities.count().await?;
        let updated = self
            .users
            .update(user_id, &mut |u: &mut User| {
                change(u);
                refresh_completion(u, total);
            })
            .await?;
        updated.ok_or_else(|| {
            tracing::warn!(user_id, "user not found");
            ServiceError::UserNotFound
        })
    }
}

pub(crate) fn require_caller(caller: Option<&str>) -> Result<&str, ServiceError> {
    caller
        .filter(|id| !id.is_empty())
        .ok_or(ServiceError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::memory::{InMemoryCityStore, InMemoryUserStore};
    use async_trait::async_trait;
    use guess_core::{City, CityId, EntryStatus, DEFAULT_DIFFICULTY};

    fn city(name: &str) -> City {
        City {
            id: name.to_lowercase(),
            name: name.to_string(),
            country: "Somewhere".into(),
            clues: vec![format!("{name} clue")],
            fun_facts: vec![format!("{name} fact")],
            trivia: vec![format!("{name} trivia")],
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    fn names(list: &[&str]) -> Vec<City> {
        list.iter().map(|n| city(n)).collect()
    }

    struct Fixture {
        service: GameService,
        users: Arc<InMemoryUserStore>,
        cities: Arc<InMemoryCityStore>,
    }

    fn fixture(cities: Vec<City>) -> Fixture {
        let users = Arc::new(InMemoryUserStore::default());
        let cities = Arc::new(InMemoryCityStore::seeded(cities, 7));
        let service = GameService::seeded(users.clone(), cities.clone(), 7);
        Fixture {
            service,
            users,
            cities,
        }
    }

    /// Counts catalog reads so tests can assert the catalog was not touched.
    struct CountingCities {
        inner: InMemoryCityStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CityStore for CountingCities {
        async fn find_by_id(&self, id: &str) -> Result<Option<City>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }
        async fn sample_one(
            &self,
            excluding: &HashSet<CityId>,
        ) -> Result<Option<City>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sample_one(excluding).await
        }
        async fn sample_many(
            &self,
            n: usize,
            excluding: &HashSet<CityId>,
        ) -> Result<Vec<City>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sample_many(n, excluding).await
        }
        async fn count(&self) -> Result<usize, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.count().await
        }
        async fn insert_many(&self, cities: Vec<City>) -> Result<(), StoreError> {
            self.inner.insert_many(cities).await
        }
    }

    struct BrokenUsers;

    #[async_trait]
    impl UserStore for BrokenUsers {
        async fn find_by_id(&self, _id: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("database error".into()))
        }
        async fn find_by_name(&self, _name: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("database error".into()))
        }
        async fn create(&self, _name: &str) -> Result<User, StoreError> {
            Err(StoreError::Unavailable("database error".into()))
        }
        async fn update(
            &self,
            _id: &str,
            _change: &mut (dyn for<'u> FnMut(&'u mut User) + Send),
        ) -> Result<Option<User>, StoreError> {
            Err(StoreError::Unavailable("database error".into()))
        }
    }

    #[tokio::test]
    async fn register_trims_and_reuses_existing_user() {
        let fx = fixture(names(&["Paris"]));
        let first = fx.service.register("  alice ").await.unwrap();
        assert_eq!(first.name, "alice");

        let again = fx.service.register("alice").await.unwrap();
        assert_eq!(again.id, first.id);

        assert!(matches!(
            fx.service.register("   ").await,
            Err(ServiceError::MissingUsername)
        ));
    }

    #[tokio::test]
    async fn profile_reports_tallies() {
        let fx = fixture(names(&["Paris", "Tokyo", "Rome"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());
        fx.service.validate_guess(caller, "paris", "Paris").await.unwrap();
        fx.service.validate_guess(caller, "tokyo", "Kyoto").await.unwrap();
        fx.service.validate_guess(caller, "rome", "ROME").await.unwrap();

        let profile = fx.service.profile(&user.id).await.unwrap();
        assert_eq!(profile.correct_score, 2);
        assert_eq!(profile.incorrect_score, 1);
        assert_eq!(profile.user.total_score, 2);

        assert!(matches!(
            fx.service.profile("nobody").await,
            Err(ServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn unauthenticated_round_never_reads_catalog() {
        let cities = Arc::new(CountingCities {
            inner: InMemoryCityStore::seeded(names(&["Paris", "Tokyo"]), 1),
            calls: AtomicUsize::new(0),
        });
        let service = GameService::seeded(Arc::new(InMemoryUserStore::default()), cities.clone(), 1);

        assert!(matches!(
            service.next_round(None).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            service.next_round(Some("")).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            service.validate_guess(None, "paris", "Paris").await,
            Err(ServiceError::Unauthenticated)
        ));
        assert_eq!(cities.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn round_for_unknown_user_is_not_found() {
        let fx = fixture(names(&["Paris"]));
        assert!(matches!(
            fx.service.next_round(Some("ghost")).await,
            Err(ServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn round_offers_four_distinct_options_including_target() {
        let fx = fixture(names(&["Paris", "Tokyo", "Rome", "Cairo", "Lima", "Oslo"]));
        let user = fx.service.register("alice").await.unwrap();

        for _ in 0..30 {
            let round = fx.service.next_round(Some(user.id.as_str())).await.unwrap();
            let target = round.target.clone().unwrap();
            let ids: HashSet<_> = round.options.iter().map(|o| o.id.clone()).collect();
            assert_eq!(round.options.len(), 4);
            assert_eq!(ids.len(), 4);
            assert!(ids.contains(&target.id));

            let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
            assert_eq!(stored.current_game.unwrap().city_id, target.id);
        }
    }

    #[tokio::test]
    async fn solved_city_is_only_a_distractor() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        fx.service
            .validate_guess(Some(user.id.as_str()), "paris", "paris")
            .await
            .unwrap();

        for _ in 0..20 {
            let round = fx.service.next_round(Some(user.id.as_str())).await.unwrap();
            assert_eq!(round.target.unwrap().id, "tokyo");
            assert!(round.options.iter().any(|o| o.id == "paris"));
        }
    }

    #[tokio::test]
    async fn exhausted_catalog_returns_empty_round_and_clears_game() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());

        fx.service.next_round(caller).await.unwrap();
        fx.service.validate_guess(caller, "paris", "Paris").await.unwrap();
        fx.service.validate_guess(caller, "tokyo", "Tokyo").await.unwrap();

        let round = fx.service.next_round(caller).await.unwrap();
        assert_eq!(round, Round::unavailable());

        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.current_game.is_none());
        assert!(stored.completed_all_cities);
    }

    #[tokio::test]
    async fn wrong_wrong_right_is_three_attempts() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());

        assert!(!fx.service.validate_guess(caller, "tokyo", "Osaka").await.unwrap().correct);
        assert!(!fx.service.validate_guess(caller, "tokyo", "Kyoto").await.unwrap().correct);
        let outcome = fx.service.validate_guess(caller, "tokyo", "tokyo").await.unwrap();
        assert_eq!(
            outcome,
            GuessOutcome {
                correct: true,
                actual_city: "Tokyo".into()
            }
        );

        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        let entry = &stored.progress["tokyo"];
        assert_eq!(entry.attempts, 3);
        assert!(entry.correct);
        assert_eq!(stored.status_of("tokyo"), EntryStatus::AttemptedCorrect);
    }

    #[tokio::test]
    async fn later_wrong_guess_keeps_city_solved() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());

        fx.service.validate_guess(caller, "paris", "Paris").await.unwrap();
        let outcome = fx.service.validate_guess(caller, "paris", "Lyon").await.unwrap();
        assert!(!outcome.correct);

        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.progress["paris"].correct);
        assert_eq!(stored.progress["paris"].attempts, 2);
        assert_eq!(stored.total_score, 1);
    }

    #[tokio::test]
    async fn racing_guesses_never_lose_a_correct_answer() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());

        let (wrong, right) = tokio::join!(
            fx.service.validate_guess(caller, "paris", "Lyon"),
            fx.service.validate_guess(caller, "paris", "Paris"),
        );
        assert!(!wrong.unwrap().correct);
        assert!(right.unwrap().correct);

        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.progress["paris"].correct);
        assert_eq!(stored.progress["paris"].attempts, 2);
        assert_eq!(stored.total_score, 1);
    }

    #[tokio::test]
    async fn unknown_city_or_user_leaves_ledger_untouched() {
        let fx = fixture(names(&["Paris"]));
        let user = fx.service.register("alice").await.unwrap();

        assert!(matches!(
            fx.service.validate_guess(Some(user.id.as_str()), "atlantis", "Atlantis").await,
            Err(ServiceError::CityNotFound)
        ));
        assert!(matches!(
            fx.service.validate_guess(Some("ghost"), "paris", "Paris").await,
            Err(ServiceError::CityNotFound)
        ));

        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.progress.is_empty());
    }

    #[tokio::test]
    async fn completion_latch_survives_catalog_growth() {
        let fx = fixture(names(&["Paris", "Tokyo"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());

        fx.service.validate_guess(caller, "paris", "Paris").await.unwrap();
        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(!stored.completed_all_cities);

        fx.service.validate_guess(caller, "tokyo", "Tokyo").await.unwrap();
        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.completed_all_cities);
        assert_eq!(stored.completed_count, 2);

        fx.cities.insert_many(vec![city("Rome")]).await.unwrap();
        fx.service.validate_guess(caller, "rome", "Milan").await.unwrap();
        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.completed_all_cities);

        let round = fx.service.next_round(caller).await.unwrap();
        assert_eq!(round.target.unwrap().id, "rome");
    }

    #[tokio::test]
    async fn reset_clears_progress_and_latch() {
        let fx = fixture(names(&["Paris"]));
        let user = fx.service.register("alice").await.unwrap();
        let caller = Some(user.id.as_str());
        fx.service.validate_guess(caller, "paris", "Paris").await.unwrap();

        fx.service.reset_progress(caller).await.unwrap();
        let stored = fx.users.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.progress.is_empty());
        assert!(!stored.completed_all_cities);
        assert_eq!(stored.total_score, 0);

        let round = fx.service.next_round(caller).await.unwrap();
        assert_eq!(round.target.unwrap().id, "paris");

        assert!(matches!(
            fx.service.reset_progress(None).await,
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn storage_failures_surface_as_store_errors() {
        let cities = Arc::new(InMemoryCityStore::seeded(names(&["Paris"]), 1));
        let service = GameService::seeded(Arc::new(BrokenUsers), cities, 1);

        let err = service.next_round(Some("u1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        assert!(matches!(
            service.validate_guess(Some("u1"), "paris", "Paris").await,
            Err(ServiceError::Store(_))
        ));
        assert!(matches!(
            service.register("alice").await,
            Err(ServiceError::Store(_))
        ));
    }
}
