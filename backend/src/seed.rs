//! Catalog seeding from the bundled city list or a JSON file on disk.

use std::collections::HashSet;
use std::path::Path;

use guess_core::{City, CitySeed, GameError};
use thiserror::Error;
use uuid::Uuid;

const BUNDLED_CATALOG: &str = include_str!("../data/cities.json");

/// Namespace for name-derived city ids. Persisted progress is keyed by these
/// ids, so they must not change between boots.
const CITY_NAMESPACE: Uuid = Uuid::from_u128(0x3f6c_2a91_5d4e_4b7a_9c08_e1d2_7b45_a6f3);

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("reading catalog: {0}")]
    Read(#[from] std::io::Error),
    #[error("parsing catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid city: {0}")]
    Invalid(#[from] GameError),
    #[error("city {0} listed twice")]
    Duplicate(String),
}

/// The id a city named `name` gets in every catalog, on every boot.
pub fn city_id(name: &str) -> String {
    Uuid::new_v5(&CITY_NAMESPACE, name.trim().to_lowercase().as_bytes()).to_string()
}

/// Loads the catalog from `path`, or the bundled one when no path is given.
/// Ids are derived from city names.
pub async fn load_catalog(path: Option<&Path>) -> Result<Vec<City>, SeedError> {
    match path {
        Some(path) => {
            let bytes = tokio::fs::read(path).await?;
            parse_catalog(&bytes)
        }
        None => bundled_catalog(),
    }
}

pub fn bundled_catalog() -> Result<Vec<City>, SeedError> {
    parse_catalog(BUNDLED_CATALOG.as_bytes())
}

fn parse_catalog(bytes: &[u8]) -> Result<Vec<City>, SeedError> {
    let seeds: Vec<CitySeed> = serde_json::from_slice(bytes)?;
    let mut seen = HashSet::new();
    let mut cities = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let id = city_id(&seed.name);
        let city = seed.into_city(id)?;
        if !seen.insert(city.id.clone()) {
            return Err(SeedError::Duplicate(city.name));
        }
        cities.push(city);
    }
    Ok(cities)
}
