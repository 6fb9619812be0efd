//! Storage seams used by the game service.
//!
//! The service does no locking of its own. Every mutation of a user goes
//! through [`UserStore::update`], which a store must run as a single atomic
//! read-modify-write of that user's record.

use std::collections::HashSet;

use async_trait::async_trait;
use guess_core::{City, CityId, User};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user name {0} already taken")]
    NameTaken(String),
    #[error("persistence io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;
    /// Fails with [`StoreError::NameTaken`] when the name is in use.
    async fn create(&self, name: &str) -> Result<User, StoreError>;
    /// Saves a user by applying `change` to the stored record as one atomic
    /// read-modify-write. Returns the result, or `None` when the user does
    /// not exist.
    ///
    /// Callers fold the completion refresh into `change`, so the derived
    /// completion fields are recomputed on every save.
    async fn update(
        &self,
        id: &str,
        change: &mut (dyn for<'u> FnMut(&'u mut User) + Send),
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait CityStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<City>, StoreError>;
    async fn sample_one(&self, excluding: &HashSet<CityId>) -> Result<Option<City>, StoreError>;
    async fn sample_many(
        &self,
        n: usize,
        excluding: &HashSet<CityId>,
    ) -> Result<Vec<City>, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
    async fn insert_many(&self, cities: Vec<City>) -> Result<(), StoreError>;
}
