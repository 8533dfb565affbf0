//! # ECS Error Types
//!
//! All errors that can occur in the ECS kernel.
//!
//! Programmer errors (double add, removal of an absent entity from a filter,
//! lock imbalance) are only checked in checked builds and surface as panics
//! carrying the message of the matching [`EcsError`]. Everything that can
//! legitimately fail at a boundary (configuration, serialization, untyped
//! access) is returned as an [`EcsResult`].

use thiserror::Error;

use crate::ecs::{Entity, PoolId};

/// Whether sanitize checks run in this build.
///
/// On with `debug_assertions`, off in release builds or when the
/// `no-sanitize` feature is enabled. This is a compile-time constant, so the
/// guarded checks vanish entirely from unchecked builds.
pub const SANITIZE: bool = cfg!(all(debug_assertions, not(feature = "no-sanitize")));

/// Panics with the given error when sanitize checks are enabled and the
/// condition does not hold.
macro_rules! sanitize_check {
    ($cond:expr, $err:expr) => {
        if $crate::error::SANITIZE && !($cond) {
            panic!("{}", $err);
        }
    };
}

pub(crate) use sanitize_check;

/// Errors that can occur in the ECS kernel.
#[derive(Error, Debug)]
pub enum EcsError {
    /// The entity id is outside the range of used slots.
    #[error("cant touch destroyed entity: {0} is out of range")]
    EntityOutOfRange(Entity),

    /// The entity slot exists but is not alive.
    #[error("entity {0} is not alive")]
    EntityNotAlive(Entity),

    /// Tried to add a component that the entity already owns.
    #[error("component {component} already attached to entity {entity}")]
    ComponentAlreadyPresent {
        /// The entity.
        entity: Entity,
        /// Component type name.
        component: &'static str,
    },

    /// Tried to read a component the entity does not own.
    #[error("component {component} not attached to entity {entity}")]
    ComponentMissing {
        /// The entity.
        entity: Entity,
        /// Component type name.
        component: &'static str,
    },

    /// A filter was asked to add an entity it already contains.
    #[error("entity {0} already in filter")]
    FilterDuplicateEntity(Entity),

    /// A filter was asked to remove an entity it does not contain.
    #[error("entity {0} not in filter")]
    FilterMissingEntity(Entity),

    /// A filter was unlocked more times than it was locked.
    #[error("invalid lock-unlock balance for filter")]
    LockImbalance,

    /// The same component appears twice in one mask.
    #[error("{0} already in constraints list")]
    DuplicateConstraint(&'static str),

    /// No room left for another component pool.
    #[error("no more room for new component in this world: {0} pools")]
    PoolTableFull(usize),

    /// Entities were spawned and never given a component.
    #[error("empty entity detected: {0} leaked entities")]
    LeakedEntities(usize),

    /// An untyped value does not match the pool's component type.
    #[error("component type mismatch: pool {pool} stores {expected}")]
    ComponentTypeMismatch {
        /// Pool the value was written to.
        pool: PoolId,
        /// Component type the pool stores.
        expected: &'static str,
    },

    /// No pool or codec is registered for the component.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// No entity is registered under the external id.
    #[error("unknown entity id: {0}")]
    UnknownEntity(u32),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure while reading configuration.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EcsError::ComponentAlreadyPresent {
            entity: Entity::from_raw(3),
            component: "Position",
        };
        assert_eq!(
            err.to_string(),
            "component Position already attached to entity 3"
        );
        assert_eq!(
            EcsError::FilterMissingEntity(Entity::from_raw(7)).to_string(),
            "entity 7 not in filter"
        );
    }

    #[test]
    fn test_sanitize_tracks_debug_assertions() {
        if cfg!(feature = "no-sanitize") {
            assert!(!SANITIZE);
        } else {
            assert_eq!(SANITIZE, cfg!(debug_assertions));
        }
    }
}
