use std::env;
use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Process settings, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    /// JSON snapshot of all users. Unset keeps users in memory only.
    pub persist_path: Option<PathBuf>,
    /// City catalog to seed from instead of the bundled one.
    pub catalog_path: Option<PathBuf>,
    /// Fixes the random source for reproducible rounds.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("RNG_SEED must be an unsigned integer, got {0:?}")]
    InvalidSeed(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rng_seed = match non_empty("RNG_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidSeed(raw))?,
            ),
            None => None,
        };

        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            persist_path: non_empty("PERSIST_PATH").map(PathBuf::from),
            catalog_path: non_empty("CATALOG_PATH").map(PathBuf::from),
            rng_seed,
        })
    }
}
