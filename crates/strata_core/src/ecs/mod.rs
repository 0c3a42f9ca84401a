//! Archetype-based Entity Component System.
//!
//! Components are registered once in a [`ComponentRegistry`], which assigns
//! each type a bit. An entity's set of components is its signature, a
//! [`Bitmask`]; every entity sharing a signature lives in the same
//! [`Archetype`], one column per component. The [`EntityManager`] migrates
//! entities between archetypes as components come and go, and the
//! [`Scheduler`] drives [`System`]s once per frame.

mod archetype;
mod bitmask;
mod component;
mod entity;
mod manager;
mod query;
mod scheduler;
pub mod storage;
mod system;
mod system_handle;
mod system_registration_error;
mod system_registry;

pub use archetype::{Archetype, ArchetypeError, ArchetypeId};
pub use bitmask::Bitmask;
pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, RegistryError};
pub use entity::{Entity, EntityLoc};
pub use manager::{EntityManager, WorldError};
pub use query::Query;
pub use scheduler::{Scheduler, SchedulerError, SystemState};
pub use system::{System, SystemError, SystemResult};
pub use system_handle::SystemHandle;
pub use system_registration_error::SystemRegistrationError;
pub use system_registry::{SystemFactory, SystemRegistry};
