use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use guess_core::{City, CityId, User};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::now_millis;
use crate::store::{CityStore, StoreError, UserStore};

/// Users kept in memory, optionally snapshotted to a JSON file after every
/// write.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryUserStore {
    /// Loads any snapshot already at `path`. A missing file starts empty;
    /// an unreadable one is an error so existing progress is not clobbered.
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<HashMap<String, User>>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(path = %path.display(), users = users.len(), "loaded user snapshot");

        Ok(Self {
            users: RwLock::new(users),
            persist_path: Some(path),
        })
    }

    /// Writes `users` to the snapshot file. Callers hold the write lock
    /// across this call so snapshots land on disk in write order.
    async fn persist(&self, users: &HashMap<String, User>) -> Result<(), StoreError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(users)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.name == name)
            .cloned())
    }

    async fn create(&self, name: &str) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.name == name) {
            return Err(StoreError::NameTaken(name.to_string()));
        }
        let user = User::new(Uuid::new_v4().to_string(), name, now_millis());
        users.insert(user.id.clone(), user.clone());
        self.persist(&users).await?;
        Ok(user)
    }

    async fn update(
        &self,
        id: &str,
        change: &mut (dyn for<'u> FnMut(&'u mut User) + Send),
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(id) else {
            return Ok(None);
        };
        change(user);
        let updated = user.clone();
        self.persist(&users).await?;
        Ok(Some(updated))
    }
}

/// The city catalog, held in insertion order so seeded sampling is
/// reproducible.
pub struct InMemoryCityStore {
    cities: RwLock<Vec<City>>,
    rng: Mutex<ChaCha8Rng>,
}

impl InMemoryCityStore {
    pub fn new(cities: Vec<City>) -> Self {
        Self::with_rng(cities, ChaCha8Rng::from_entropy())
    }

    pub fn seeded(cities: Vec<City>, seed: u64) -> Self {
        Self::with_rng(cities, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(cities: Vec<City>, rng: ChaCha8Rng) -> Self {
        Self {
            cities: RwLock::new(cities),
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl CityStore for InMemoryCityStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<City>, StoreError> {
        Ok(self
            .cities
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn sample_one(&self, excluding: &HashSet<CityId>) -> Result<Option<City>, StoreError> {
        let cities = self.cities.read().await;
        let mut rng = self.rng.lock().await;
        Ok(guess_core::sample_one(&cities, excluding, &mut *rng).cloned())
    }

    async fn sample_many(
        &self,
        n: usize,
        excluding: &HashSet<CityId>,
    ) -> Result<Vec<City>, StoreError> {
        let cities = self.cities.read().await;
        let mut rng = self.rng.lock().await;
        Ok(guess_core::sample_many(&cities, n, excluding, &mut *rng)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.cities.read().await.len())
    }

    async fn insert_many(&self, new_cities: Vec<City>) -> Result<(), StoreError> {
        let mut cities = self.cities.write().await;
        for city in new_cities {
            if !cities.iter().any(|c| c.id == city.id) {
                cities.push(city);
            }
        }
        Ok(())
    }
}
