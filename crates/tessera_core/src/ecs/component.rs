//! # Component System
//!
//! Components are plain data with no behavior. Each component type gets its
//! own [`ComponentPool`](super::ComponentPool) inside a world.
//!
//! Two optional hooks customise how pools treat a component:
//! - [`Component::auto_reset`] initialises fresh slots and clears freed ones.
//!   The default resets to `Default::default()`.
//! - [`Component::auto_copy`] runs when a pool copies one entity's value to
//!   another. The default is `Clone::clone_from`, which is shallow for
//!   shared handles such as `Rc`.

use std::any::{Any, TypeId};
use std::fmt;

use super::pool::{ComponentPool, PoolId, PoolSizing, PoolStorage};

/// Marker trait for ECS components.
///
/// # Example
///
/// ```rust
/// use tessera_core::Component;
///
/// #[derive(Clone, Default, Debug, PartialEq)]
/// struct Health {
///     current: u32,
///     max: u32,
/// }
///
/// impl Component for Health {
///     fn auto_reset(&mut self) {
///         self.current = 100;
///         self.max = 100;
///     }
/// }
/// ```
pub trait Component: Clone + Default + 'static {
    /// Puts the value into its initial state.
    ///
    /// Called on every slot handed out by `add` and on every slot freed by
    /// `remove`.
    #[inline]
    fn auto_reset(&mut self) {
        *self = Self::default();
    }

    /// Copies `src` into `dst`.
    ///
    /// Override to deep-copy fields that `Clone` only shares.
    #[inline]
    fn auto_copy(src: &Self, dst: &mut Self) {
        dst.clone_from(src);
    }
}

/// Run-time type token for a component type.
///
/// Lets world-level code create pools and clone values without compile-time
/// knowledge of the component type.
#[derive(Clone, Copy)]
pub struct ComponentMeta {
    type_id: TypeId,
    type_name: &'static str,
    new_pool: fn(PoolId, PoolSizing) -> Box<dyn PoolStorage>,
    clone_value: fn(&dyn Any) -> Box<dyn Any>,
}

impl ComponentMeta {
    /// Returns the token for `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            new_pool: new_pool::<T>,
            clone_value: clone_value::<T>,
        }
    }

    /// Returns the component's `TypeId`.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the full type name.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        let start = base.rfind("::").map_or(0, |idx| idx + 2);
        &self.type_name[start..]
    }

    pub(crate) fn new_pool(&self, id: PoolId, sizing: PoolSizing) -> Box<dyn PoolStorage> {
        (self.new_pool)(id, sizing)
    }
}

fn new_pool<T: Component>(id: PoolId, sizing: PoolSizing) -> Box<dyn PoolStorage> {
    Box::new(ComponentPool::<T>::new(id, sizing))
}

fn clone_value<T: Component>(value: &dyn Any) -> Box<dyn Any> {
    match value.downcast_ref::<T>() {
        Some(value) => Box::new(value.clone()),
        None => unreachable!("component meta used with a foreign value"),
    }
}

impl PartialEq for ComponentMeta {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentMeta {}

impl fmt::Debug for ComponentMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentMeta").field(&self.type_name).finish()
    }
}

/// A component value with its type erased.
///
/// Produced by untyped pool reads and consumed by untyped writes, snapshot
/// export, and import.
pub struct RawComponent {
    meta: ComponentMeta,
    value: Box<dyn Any>,
}

impl RawComponent {
    /// Wraps a typed component value.
    #[must_use]
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            meta: ComponentMeta::of::<T>(),
            value: Box::new(value),
        }
    }

    /// Returns the type token of the wrapped value.
    #[inline]
    #[must_use]
    pub fn meta(&self) -> ComponentMeta {
        self.meta
    }

    /// Returns the wrapped value's `TypeId`.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.meta.type_id
    }

    /// Borrows the value as `T`, if it is one.
    #[inline]
    #[must_use]
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Unwraps the value as `T`.
    ///
    /// # Errors
    ///
    /// Gives the raw component back if it does not hold a `T`.
    pub fn into_inner<T: Component>(self) -> Result<T, Self> {
        if self.meta.type_id != TypeId::of::<T>() {
            return Err(self);
        }
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type id checked above"),
        }
    }

    /// Borrows the erased value.
    #[inline]
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        self.value.as_ref()
    }
}

impl Clone for RawComponent {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta,
            value: (self.meta.clone_value)(self.value.as_ref()),
        }
    }
}

impl fmt::Debug for RawComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawComponent")
            .field("type", &self.meta.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Tag;

    impl Component for Tag {}

    #[test]
    fn test_meta_names() {
        let meta = ComponentMeta::of::<Position>();
        assert_eq!(meta.short_name(), "Position");
        assert!(meta.type_name().ends_with("Position"));
        assert_eq!(meta, ComponentMeta::of::<Position>());
        assert_ne!(meta, ComponentMeta::of::<Tag>());
    }

    #[test]
    fn test_raw_component_roundtrip() {
        let raw = RawComponent::new(Position { x: 1.0, y: 2.0 });
        assert_eq!(raw.type_id(), TypeId::of::<Position>());
        assert_eq!(raw.downcast_ref::<Position>(), Some(&Position { x: 1.0, y: 2.0 }));
        assert!(raw.downcast_ref::<Tag>().is_none());

        let copy = raw.clone();
        let raw = raw.into_inner::<Tag>().unwrap_err();
        assert_eq!(raw.into_inner::<Position>().unwrap(), Position { x: 1.0, y: 2.0 });
        assert_eq!(copy.downcast_ref::<Position>().unwrap().y, 2.0);
    }

    #[test]
    fn test_default_hooks() {
        let mut value = Position { x: 3.0, y: 4.0 };
        value.auto_reset();
        assert_eq!(value, Position::default());

        let src = Position { x: 5.0, y: 6.0 };
        Position::auto_copy(&src, &mut value);
        assert_eq!(value, src);
    }
}
