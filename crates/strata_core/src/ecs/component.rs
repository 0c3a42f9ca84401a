// component.rs - Component registration
//
// Components are identified by a bit position handed out by the registry in
// registration order. The registry is an explicit object: it is populated at
// startup and then shared (read-only) with every EntityManager built from it.

use crate::ecs::storage::{Column, ComponentBox, ErasedColumn};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, size_of};
use thiserror::Error;

/// Bit position of a component inside a [`Bitmask`](crate::ecs::Bitmask).
pub type ComponentId = u32;

/// Trait for Rust-defined components.
///
/// `Default` provides the zero value used when a component is attached
/// without an explicit value or constructed by name.
pub trait Component: 'static + Sized + Send + Sync + Default {
    /// Declarative name, unique within a registry.
    const NAME: &'static str;

    /// Runs once on a freshly default-constructed value.
    fn init(&mut self) {}

    /// Runs before the value of a destroyed entity is discarded.
    /// Components owning external handles release them here.
    fn reset(&mut self) {}
}

/// Helper macro to implement the `Component` trait without hooks.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Copy, Default)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, "Position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
        }
    };
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component '{name}' is already registered at bit {id}")]
    AlreadyRegistered { name: &'static str, id: ComponentId },

    #[error("component name '{name}' is already used by type {existing}")]
    NameConflict {
        name: &'static str,
        existing: &'static str,
    },

    #[error("no component named '{name}' is registered")]
    UnknownComponent { name: String },

    #[error("component type {type_name} is not registered")]
    NotRegistered { type_name: &'static str },
}

/// Type-erased descriptor for one registered component type.
///
/// Holds the monomorphized function pointers the storage layer needs so that
/// no runtime type inspection happens on the hot path.
#[derive(Clone)]
pub struct ComponentInfo {
    id: ComponentId,
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    size: usize,
    align: usize,
    new_column: fn(usize) -> Box<dyn ErasedColumn>,
    construct: fn() -> ComponentBox,
    is_instance: fn(&(dyn Any + Send + Sync)) -> bool,
    reset: fn(&mut (dyn Any + Send + Sync)),
}

impl ComponentInfo {
    fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: T::NAME,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            new_column: new_column::<T>,
            construct: construct::<T>,
            is_instance: is_instance::<T>,
            reset: reset::<T>,
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Allocate an empty column able to hold `capacity` rows without growing.
    pub fn new_column(&self, capacity: usize) -> Box<dyn ErasedColumn> {
        (self.new_column)(capacity)
    }

    /// Default-construct a value (with its `init` hook applied).
    pub fn construct(&self) -> ComponentBox {
        (self.construct)()
    }

    /// Whether `value` is an instance of this component type.
    pub fn is_instance(&self, value: &(dyn Any + Send + Sync)) -> bool {
        (self.is_instance)(value)
    }

    /// Run the `reset` hook on `value`. Values of another type are ignored.
    pub fn reset(&self, value: &mut (dyn Any + Send + Sync)) {
        (self.reset)(value)
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

fn new_column<T: Component>(capacity: usize) -> Box<dyn ErasedColumn> {
    Box::new(Column::<T>::with_capacity(capacity))
}

fn construct<T: Component>() -> ComponentBox {
    let mut value = T::default();
    value.init();
    Box::new(value)
}

fn is_instance<T: Component>(value: &(dyn Any + Send + Sync)) -> bool {
    value.is::<T>()
}

fn reset<T: Component>(value: &mut (dyn Any + Send + Sync)) {
    if let Some(component) = value.downcast_mut::<T>() {
        component.reset();
    }
}

/// Mapping from component types (and names) to bit positions.
#[derive(Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<&'static str, ComponentId>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, assigning it the next unused bit.
    ///
    /// A second registration of the same type is reported (and logged) as
    /// `AlreadyRegistered`; the original bit stays in place.
    pub fn register<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        if let Some(&id) = self.by_type.get(&TypeId::of::<T>()) {
            tracing::warn!(component = T::NAME, bit = id, "component registered twice");
            return Err(RegistryError::AlreadyRegistered { name: T::NAME, id });
        }
        if let Some(&existing) = self.by_name.get(T::NAME) {
            return Err(RegistryError::NameConflict {
                name: T::NAME,
                existing: self.infos[existing as usize].type_name,
            });
        }

        let id = self.infos.len() as ComponentId;
        self.infos.push(ComponentInfo::of::<T>(id));
        self.by_type.insert(TypeId::of::<T>(), id);
        self.by_name.insert(T::NAME, id);
        tracing::debug!(component = T::NAME, bit = id, "registered component");
        Ok(id)
    }

    /// Register `T` unless it already is; either way return its bit.
    ///
    /// Suited to init code that may run once per independently loaded module.
    pub fn ensure_registered<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        match self.bit_of::<T>() {
            Some(id) => {
                tracing::debug!(component = T::NAME, bit = id, "component already registered");
                Ok(id)
            }
            None => self.register::<T>(),
        }
    }

    /// Bit assigned to `T`, if registered.
    pub fn bit_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Bit assigned to `T`, or `NotRegistered`.
    pub fn require_bit<T: Component>(&self) -> Result<ComponentId, RegistryError> {
        self.bit_of::<T>().ok_or(RegistryError::NotRegistered {
            type_name: type_name::<T>(),
        })
    }

    /// Bit assigned to the component registered under `name`.
    pub fn bit_of_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Descriptor for a bit.
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id as usize)
    }

    /// Descriptor for a declarative name.
    pub fn info_by_name(&self, name: &str) -> Option<&ComponentInfo> {
        self.bit_of_name(name).and_then(|id| self.info(id))
    }

    /// Instantiate a zero-valued component by its declarative name.
    ///
    /// Returns the bit alongside the value so the caller can attach it with
    /// `EntityManager::insert_boxed`.
    pub fn construct(&self, name: &str) -> Result<(ComponentId, ComponentBox), RegistryError> {
        let info = self
            .info_by_name(name)
            .ok_or_else(|| RegistryError::UnknownComponent {
                name: name.to_string(),
            })?;
        Ok((info.id, info.construct()))
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Descriptors in bit order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.infos.iter()).finish()
    }
}
