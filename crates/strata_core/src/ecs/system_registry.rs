// system_registry.rs - Name-keyed system constructors
//
// Loaders that read a declarative system list instantiate systems by name
// through this registry; the core never inspects the list format itself.

use crate::ecs::{System, SystemHandle, SystemRegistrationError};
use std::collections::HashMap;
use std::fmt;

/// Constructor for a boxed system.
pub type SystemFactory = Box<dyn Fn() -> Box<dyn System> + Send + Sync>;

#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<RegisteredSystem>,
    name_lookup: HashMap<String, SystemHandle>,
}

struct RegisteredSystem {
    name: String,
    factory: SystemFactory,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`. Names are unique.
    pub fn register_system<F, S>(
        &mut self,
        name: impl Into<String>,
        ctor: F,
    ) -> Result<SystemHandle, SystemRegistrationError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: System + 'static,
    {
        let name = name.into();
        if let Some(&existing) = self.name_lookup.get(&name) {
            return Err(SystemRegistrationError::DuplicateName { name, existing });
        }

        let handle = SystemHandle::new(self.systems.len() as u32);
        self.name_lookup.insert(name.clone(), handle);
        self.systems.push(RegisteredSystem {
            name,
            factory: Box::new(move || Box::new(ctor()) as Box<dyn System>),
        });
        Ok(handle)
    }

    /// Constructor registered under `name`.
    pub fn get_system(&self, name: &str) -> Option<&SystemFactory> {
        let handle = self.name_lookup.get(name)?;
        self.systems
            .get(handle.index() as usize)
            .map(|system| &system.factory)
    }

    /// Build a fresh instance of the system registered under `name`.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn System>, SystemRegistrationError> {
        self.get_system(name)
            .map(|factory| factory())
            .ok_or_else(|| SystemRegistrationError::UnknownSystem {
                name: name.to_string(),
            })
    }

    pub fn handle_of(&self, name: &str) -> Option<SystemHandle> {
        self.name_lookup.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|system| system.name.as_str())
    }
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
