use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use guess_core::{City, GuessOutcome, Round, RoundOption, RoundTarget};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod memory;
pub mod seed;
pub mod service;
pub mod store;

use crate::config::Config;
use crate::error::ServiceError;
use crate::memory::{InMemoryCityStore, InMemoryUserStore};
use crate::seed::SeedError;
use crate::service::{require_caller, GameService, Profile};
use crate::store::{StoreError, UserStore};

/// Header carrying the caller's opaque user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    service: Arc<GameService>,
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppState {
    pub fn new(service: GameService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Fresh in-memory stores over `cities`, with reproducible randomness.
    pub fn in_memory(cities: Vec<City>, seed: u64) -> Self {
        let users = Arc::new(InMemoryUserStore::default());
        let cities = Arc::new(InMemoryCityStore::seeded(cities, seed));
        Self::new(GameService::seeded(users, cities, seed))
    }

    pub async fn from_config(config: &Config) -> Result<Self, BootError> {
        let catalog = seed::load_catalog(config.catalog_path.as_deref()).await?;
        tracing::info!(cities = catalog.len(), "catalog seeded");

        let users: Arc<dyn UserStore> = match &config.persist_path {
            Some(path) => Arc::new(InMemoryUserStore::with_persistence(path.clone()).await?),
            None => Arc::new(InMemoryUserStore::default()),
        };

        let service = match config.rng_seed {
            Some(seed) => GameService::seeded(
                users,
                Arc::new(InMemoryCityStore::seeded(catalog, seed)),
                seed,
            ),
            None => GameService::new(users, Arc::new(InMemoryCityStore::new(catalog))),
        };
        Ok(Self::new(service))
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/user", post(create_user))
        .route("/user/me", get(current_user))
        .route("/user/me/reset", post(reset_user))
        .route("/user/:id", get(user_by_id))
        .route("/city/random", get(random_city))
        .route("/city/validate", post(validate_guess))
        .with_state(state)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn caller(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_HEADER).and_then(|v| v.to_str().ok())
}

#[derive(Deserialize)]
struct CreateUserRequest {
    #[serde(default)]
    username: String,
}

#[derive(Serialize)]
struct CreateUserResponse {
    user_id: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.service.register(&payload.username).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse { user_id: user.id }),
    ))
}

async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ServiceError> {
    let user_id = require_caller(caller(&headers))?;
    Ok(Json(state.service.profile(user_id).await?))
}

async fn user_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>, ServiceError> {
    Ok(Json(state.service.profile(&user_id).await?))
}

async fn reset_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    state.service.reset_progress(caller(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `{}` when no round is available, matching what clients expect.
#[derive(Serialize)]
#[serde(untagged)]
enum TargetView {
    Target(RoundTarget),
    Empty {},
}

#[derive(Serialize)]
struct RoundResponse {
    target: TargetView,
    options: Vec<RoundOption>,
}

impl From<Round> for RoundResponse {
    fn from(round: Round) -> Self {
        Self {
            target: round
                .target
                .map(TargetView::Target)
                .unwrap_or(TargetView::Empty {}),
            options: round.options,
        }
    }
}

async fn random_city(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RoundResponse>, ServiceError> {
    let round = state.service.next_round(caller(&headers)).await?;
    Ok(Json(round.into()))
}

#[derive(Deserialize)]
struct ValidateRequest {
    city_id: String,
    guess: String,
}

async fn validate_guess(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ValidateRequest>,
) -> Result<Json<GuessOutcome>, ServiceError> {
    let outcome = state
        .service
        .validate_guess(caller(&headers), &payload.city_id, &payload.guess)
        .await?;
    Ok(Json(outcome))
}
