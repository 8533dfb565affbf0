//! # JSON Entity Codec
//!
//! Per-entity JSON export/import on top of the [`EntityRegistry`].
//!
//! Components are type-erased inside a world, so the codec keeps a table of
//! registered component types with their serde functions:
//!
//! ```json
//! {
//!   "entity_id": 7,
//!   "components": {
//!     "PersistentId": 7,
//!     "Serializable": null,
//!     "Health": { "current": 80, "max": 100 }
//!   }
//! }
//! ```
//!
//! Like snapshot export, only entities carrying [`Serializable`] have their
//! components written; other entities export an empty component map.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::component::{Component, ComponentMeta, RawComponent};
use super::entity::Entity;
use super::registry::{
    ComponentMap, EntityName, EntityRegistry, EntitySnapshot, PersistentId, Serializable,
};
use super::world::World;
use crate::error::{EcsError, EcsResult};

/// JSON form of one exported entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityJson {
    /// External id from the registry.
    pub entity_id: u32,
    /// Component values keyed by registered name.
    pub components: BTreeMap<String, Value>,
}

struct Codec {
    name: String,
    encode: fn(&RawComponent) -> EcsResult<Value>,
    decode: fn(Value) -> EcsResult<RawComponent>,
}

fn encode<T: Component + Serialize>(raw: &RawComponent) -> EcsResult<Value> {
    let value = raw
        .downcast_ref::<T>()
        .ok_or_else(|| EcsError::UnknownComponent(raw.meta().type_name().to_owned()))?;
    Ok(serde_json::to_value(value)?)
}

fn decode<T: Component + DeserializeOwned>(value: Value) -> EcsResult<RawComponent> {
    Ok(RawComponent::new(serde_json::from_value::<T>(value)?))
}

/// Table of component types that can cross the JSON boundary.
pub struct JsonCodec {
    by_type: HashMap<TypeId, Codec>,
    by_name: HashMap<String, TypeId>,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonCodec {
    /// Creates a codec that knows the registry's own components.
    #[must_use]
    pub fn new() -> Self {
        let mut codec = Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
        };
        codec
            .register::<PersistentId>()
            .register::<EntityName>()
            .register::<Serializable>();
        codec
    }

    /// Registers `T` under its short type name.
    pub fn register<T: Component + Serialize + DeserializeOwned>(&mut self) -> &mut Self {
        let name = ComponentMeta::of::<T>().short_name();
        self.register_as::<T>(name)
    }

    /// Registers `T` under an explicit name.
    ///
    /// Re-registering a type replaces its previous name.
    pub fn register_as<T: Component + Serialize + DeserializeOwned>(
        &mut self,
        name: &str,
    ) -> &mut Self {
        let type_id = TypeId::of::<T>();
        if let Some(old) = self.by_type.remove(&type_id) {
            self.by_name.remove(&old.name);
        }
        self.by_name.insert(name.to_owned(), type_id);
        self.by_type.insert(
            type_id,
            Codec {
                name: name.to_owned(),
                encode: encode::<T>,
                decode: decode::<T>,
            },
        );
        self
    }

    /// Checks if the component type is registered.
    #[must_use]
    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    fn encode_map<'a>(
        &self,
        components: impl IntoIterator<Item = &'a RawComponent>,
    ) -> EcsResult<BTreeMap<String, Value>> {
        components
            .into_iter()
            .map(|raw| {
                let codec = self
                    .by_type
                    .get(&raw.type_id())
                    .ok_or_else(|| EcsError::UnknownComponent(raw.meta().type_name().to_owned()))?;
                Ok((codec.name.clone(), (codec.encode)(raw)?))
            })
            .collect()
    }

    fn decode_value(&self, name: &str, value: Value) -> EcsResult<RawComponent> {
        let codec = self
            .by_name
            .get(name)
            .and_then(|type_id| self.by_type.get(type_id))
            .ok_or_else(|| EcsError::UnknownComponent(name.to_owned()))?;
        (codec.decode)(value)
    }

    /// Encodes one registered entity.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownEntity`] if the entity has no [`PersistentId`].
    /// - [`EcsError::UnknownComponent`] if a component type is unregistered.
    pub fn entity_to_json(&self, world: &World, entity: Entity) -> EcsResult<EntityJson> {
        let id = world
            .try_get::<PersistentId>(entity)
            .ok_or(EcsError::UnknownEntity(entity.raw()))?
            .0;
        let components = if world.has::<Serializable>(entity) {
            self.encode_map(world.components(entity).iter())?
        } else {
            BTreeMap::new()
        };
        Ok(EntityJson {
            entity_id: id,
            components,
        })
    }

    /// Encodes one registered entity as a JSON string.
    ///
    /// # Errors
    ///
    /// Same as [`entity_to_json`](Self::entity_to_json).
    pub fn serialize_entity(&self, world: &World, entity: Entity) -> EcsResult<String> {
        Ok(serde_json::to_string(&self.entity_to_json(world, entity)?)?)
    }

    /// Spawns an entity from its JSON form and registers it under its
    /// stored id.
    ///
    /// # Errors
    ///
    /// - [`EcsError::Json`] if the text is malformed.
    /// - [`EcsError::UnknownComponent`] if a component name is unregistered.
    pub fn deserialize_entity(
        &self,
        registry: &mut EntityRegistry,
        world: &mut World,
        json: &str,
    ) -> EcsResult<Entity> {
        let parsed: EntityJson = serde_json::from_str(json)?;
        let components = parsed
            .components
            .into_iter()
            .map(|(name, value)| self.decode_value(&name, value))
            .collect::<EcsResult<Vec<_>>>()?;

        let entity = world.spawn();
        for raw in components {
            world.set_raw_by_type(entity, raw)?;
        }
        Ok(registry.register(world, parsed.entity_id, entity))
    }

    /// Encodes a registry snapshot as a JSON array of entities.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] if a component type is unregistered.
    pub fn snapshot_to_string(&self, snapshot: &EntitySnapshot) -> EcsResult<String> {
        let entities = snapshot
            .iter()
            .map(|(&id, components)| {
                Ok(EntityJson {
                    entity_id: id,
                    components: self.encode_map(components.values())?,
                })
            })
            .collect::<EcsResult<Vec<_>>>()?;
        Ok(serde_json::to_string(&entities)?)
    }

    /// Decodes a snapshot written by
    /// [`snapshot_to_string`](Self::snapshot_to_string).
    ///
    /// # Errors
    ///
    /// [`EcsError::Json`] on malformed text, [`EcsError::UnknownComponent`]
    /// on unregistered names.
    pub fn snapshot_from_str(&self, json: &str) -> EcsResult<EntitySnapshot> {
        let entities: Vec<EntityJson> = serde_json::from_str(json)?;
        entities
            .into_iter()
            .map(|entity| {
                let components: ComponentMap = entity
                    .components
                    .into_iter()
                    .map(|(name, value)| {
                        let raw = self.decode_value(&name, value)?;
                        Ok((raw.type_id(), raw))
                    })
                    .collect::<EcsResult<_>>()?;
                Ok((entity.entity_id, components))
            })
            .collect()
    }
}
