//! # World Configuration
//!
//! Initial sizing for every growable structure a world owns. Every value
//! grows on demand, so the configuration only tunes how many reallocations
//! happen while the world warms up.
//!
//! Configuration can be built in code or loaded once at startup from TOML:
//!
//! ```toml
//! entities = 4096
//! pool_dense_size = 1024
//! entity_components_size = 16
//! ```
//!
//! Missing keys and zero values fall back to the documented defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Sizing configuration for a [`World`](crate::ecs::World).
///
/// A field left at zero means "use the default".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Initial number of entity slots.
    pub entities: usize,
    /// Initial capacity of the recycled-entity list.
    pub recycled_entities: usize,
    /// Initial size of the pool table (and the pool-id filter index).
    pub pools: usize,
    /// Initial size of the filter registry.
    pub filters: usize,
    /// Initial dense capacity of every component pool.
    pub pool_dense_size: usize,
    /// Initial number of recycled dense slots every pool reserves.
    pub pool_recycled_size: usize,
    /// Initial number of component ids each raw entity slot can hold.
    pub entity_components_size: usize,
}

impl WorldConfig {
    /// Default number of entity slots.
    pub const ENTITIES_DEFAULT: usize = 512;
    /// Default recycled-entity capacity.
    pub const RECYCLED_ENTITIES_DEFAULT: usize = 512;
    /// Default pool table size.
    pub const POOLS_DEFAULT: usize = 512;
    /// Default filter registry size.
    pub const FILTERS_DEFAULT: usize = 512;
    /// Default dense capacity per pool.
    pub const POOL_DENSE_SIZE_DEFAULT: usize = 512;
    /// Default recycled slots per pool.
    pub const POOL_RECYCLED_SIZE_DEFAULT: usize = 512;
    /// Default component ids per raw entity slot.
    pub const ENTITY_COMPONENTS_SIZE_DEFAULT: usize = 8;

    /// Creates a configuration with only the entity capacity set.
    #[must_use]
    pub fn with_entities(entities: usize) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the text is not valid TOML or
    /// does not match the expected keys.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        toml::from_str(text).map_err(|err| EcsError::InvalidConfig(err.to_string()))
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Io`] if the file cannot be read, or
    /// [`EcsError::InvalidConfig`] if it cannot be parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EcsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Returns a copy with every zero field replaced by its default.
    #[must_use]
    pub fn resolved(self) -> Self {
        fn or(value: usize, default: usize) -> usize {
            if value > 0 {
                value
            } else {
                default
            }
        }

        Self {
            entities: or(self.entities, Self::ENTITIES_DEFAULT),
            recycled_entities: or(self.recycled_entities, Self::RECYCLED_ENTITIES_DEFAULT),
            pools: or(self.pools, Self::POOLS_DEFAULT),
            filters: or(self.filters, Self::FILTERS_DEFAULT),
            pool_dense_size: or(self.pool_dense_size, Self::POOL_DENSE_SIZE_DEFAULT),
            pool_recycled_size: or(self.pool_recycled_size, Self::POOL_RECYCLED_SIZE_DEFAULT),
            entity_components_size: or(
                self.entity_components_size,
                Self::ENTITY_COMPONENTS_SIZE_DEFAULT,
            ),
        }
    }
}
