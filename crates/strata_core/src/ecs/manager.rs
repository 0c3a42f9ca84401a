// manager.rs - Entity lifecycle, archetype migration and queries
//
// The manager owns every archetype and knows where each entity's row lives.
// Adding or removing a component moves the entity's whole row to the
// archetype of its new signature, so a migration costs O(components on the
// entity) regardless of how many entities exist.

use crate::ecs::storage::{ComponentBox, ComponentRow};
use crate::ecs::{
    Archetype, ArchetypeError, ArchetypeId, Bitmask, Component, ComponentId, ComponentRegistry,
    Entity, EntityLoc, Query, RegistryError,
};
use crate::settings::EngineSettings;
use rayon::prelude::*;
use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity {entity} does not exist")]
    EntityNotFound { entity: Entity },

    #[error("component type {type_name} is not registered")]
    ComponentNotRegistered { type_name: &'static str },

    #[error("component bit {component} is not registered")]
    UnknownComponent { component: ComponentId },

    #[error("value for component {component} is not a {expected}")]
    TypeMismatch {
        component: ComponentId,
        expected: &'static str,
    },

    #[error(transparent)]
    Archetype(#[from] ArchetypeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Owns all archetypes and the entity → (archetype, row) map.
pub struct EntityManager {
    registry: Arc<ComponentRegistry>,
    next_entity_id: u64,
    archetypes: Vec<Archetype>,
    by_signature: HashMap<Bitmask, ArchetypeId>,
    comp_index: HashMap<ComponentId, Vec<ArchetypeId>>,
    locations: HashMap<Entity, EntityLoc>,
    row_capacity: usize,
}

impl EntityManager {
    /// Create an empty manager over a fully populated registry.
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            next_entity_id: 1,
            archetypes: Vec::new(),
            by_signature: HashMap::new(),
            comp_index: HashMap::new(),
            locations: HashMap::new(),
            row_capacity: 0,
        }
    }

    /// Create a manager whose archetypes reserve rows per `settings`.
    pub fn with_settings(registry: Arc<ComponentRegistry>, settings: &EngineSettings) -> Self {
        let mut manager = Self::new(registry);
        manager.row_capacity = settings.archetype_row_capacity;
        manager
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Create an entity with no components.
    ///
    /// Ids increase monotonically and are never reused.
    pub fn new_entity(&mut self) -> Entity {
        let entity = Entity::from_raw(self.next_entity_id);
        self.next_entity_id += 1;

        let placed = self
            .archetype_for(&Bitmask::new())
            .and_then(|archetype| self.place(entity, archetype, ComponentRow::new()));
        if let Err(err) = placed {
            panic!("empty archetype rejected fresh entity {entity}: {err}");
        }
        entity
    }

    /// Destroy `entity`, running each component's `reset` hook before the
    /// values are dropped.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), WorldError> {
        let loc = self
            .locations
            .remove(&entity)
            .ok_or(WorldError::EntityNotFound { entity })?;
        let row = self.archetypes[loc.archetype.index()].remove_entity(entity)?;
        self.repair_displaced(loc);

        for (component, mut value) in row {
            if let Some(info) = self.registry.info(component) {
                info.reset(&mut *value);
            }
        }
        tracing::trace!(%entity, archetype = %loc.archetype, "despawned entity");
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    // ------------------------------------------------------------------
    // Structural changes
    // ------------------------------------------------------------------

    /// Attach a default-constructed `T` and return it for initialisation.
    ///
    /// If the entity already has a `T` this is a no-op returning the
    /// existing value unchanged.
    pub fn add_component<T: Component>(&mut self, entity: Entity) -> Result<&mut T, WorldError> {
        let component = self.bit::<T>()?;
        let loc = self.location(entity)?;
        if !self.archetypes[loc.archetype.index()].signature().has(component) {
            let mut value = T::default();
            value.init();
            self.attach(entity, loc, component, Box::new(value))?;
        }
        Ok(self.must_get_component_mut::<T>(entity))
    }

    /// Attach `value`, or overwrite the existing `T` in place (the old value
    /// gets its `reset` hook) without migrating.
    pub fn insert_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, WorldError> {
        let component = self.bit::<T>()?;
        let loc = self.location(entity)?;
        match self.archetypes[loc.archetype.index()].column_mut::<T>(component) {
            Some(column) => {
                if let Some(slot) = column.get_mut(loc.row) {
                    let mut old = std::mem::replace(slot, value);
                    old.reset();
                }
            }
            None => self.attach(entity, loc, component, Box::new(value))?,
        }
        Ok(self.must_get_component_mut::<T>(entity))
    }

    /// Attach a type-erased value, as produced by
    /// [`ComponentRegistry::construct`]. Overwrites in place when present.
    pub fn insert_boxed(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: ComponentBox,
    ) -> Result<(), WorldError> {
        let info = self
            .registry
            .info(component)
            .ok_or(WorldError::UnknownComponent { component })?;
        if !info.is_instance(&*value) {
            return Err(WorldError::TypeMismatch {
                component,
                expected: info.type_name(),
            });
        }
        let loc = self.location(entity)?;
        let archetype = &mut self.archetypes[loc.archetype.index()];
        if archetype.signature().has(component) {
            let mut old = archetype.replace_component(entity, component, value)?;
            info.reset(&mut *old);
            Ok(())
        } else {
            self.attach(entity, loc, component, value)
        }
    }

    /// Detach `T` and hand it back. `Ok(None)` if the entity had no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<Option<T>, WorldError> {
        let component = self.bit::<T>()?;
        match self.remove_boxed(entity, component)? {
            Some(value) => value
                .downcast::<T>()
                .map(|value| Some(*value))
                .map_err(|_| WorldError::TypeMismatch {
                    component,
                    expected: type_name::<T>(),
                }),
            None => Ok(None),
        }
    }

    /// Type-erased counterpart of [`remove_component`](Self::remove_component).
    pub fn remove_boxed(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> Result<Option<ComponentBox>, WorldError> {
        let loc = self.location(entity)?;
        let source = self.archetypes[loc.archetype.index()].signature();
        if !source.has(component) {
            return Ok(None);
        }
        let target = source.without(component);
        let destination = self.archetype_for(&target)?;

        let mut row = self.take_row(entity, loc)?;
        let value = row.remove(&component);
        self.place(entity, destination, row)?;
        tracing::trace!(%entity, from = %loc.archetype, to = %destination, "migrated entity");
        Ok(value)
    }

    fn attach(
        &mut self,
        entity: Entity,
        loc: EntityLoc,
        component: ComponentId,
        value: ComponentBox,
    ) -> Result<(), WorldError> {
        let target = self.archetypes[loc.archetype.index()]
            .signature()
            .with(component);
        let destination = self.archetype_for(&target)?;

        let mut row = self.take_row(entity, loc)?;
        row.insert(component, value);
        self.place(entity, destination, row)?;
        tracing::trace!(%entity, from = %loc.archetype, to = %destination, "migrated entity");
        Ok(())
    }

    /// Pull the entity's row out of its archetype, fixing up whichever
    /// entity swap-and-pop moved into the hole.
    fn take_row(&mut self, entity: Entity, loc: EntityLoc) -> Result<ComponentRow, WorldError> {
        let row = self.archetypes[loc.archetype.index()].remove_entity(entity)?;
        self.locations.remove(&entity);
        self.repair_displaced(loc);
        Ok(row)
    }

    fn place(
        &mut self,
        entity: Entity,
        archetype: ArchetypeId,
        components: ComponentRow,
    ) -> Result<(), WorldError> {
        let row = self.archetypes[archetype.index()].add_entity(entity, components)?;
        self.locations.insert(entity, EntityLoc { archetype, row });
        Ok(())
    }

    fn repair_displaced(&mut self, vacated: EntityLoc) {
        let archetype = &self.archetypes[vacated.archetype.index()];
        if let Some(&moved) = archetype.entities().get(vacated.row) {
            if let Some(loc) = self.locations.get_mut(&moved) {
                loc.row = vacated.row;
            }
        }
    }

    /// Find the archetype with exactly `signature`, creating it if needed.
    fn archetype_for(&mut self, signature: &Bitmask) -> Result<ArchetypeId, WorldError> {
        if let Some(&id) = self.by_signature.get(signature) {
            return Ok(id);
        }

        let id = ArchetypeId::new(self.archetypes.len() as u32);
        let archetype = Archetype::new(id, signature.clone(), &self.registry, self.row_capacity)?;
        for component in signature.iter() {
            self.comp_index.entry(component).or_default().push(id);
        }
        self.by_signature.insert(signature.clone(), id);
        self.archetypes.push(archetype);
        tracing::debug!(archetype = %id, ?signature, "created archetype");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let component = self.registry.bit_of::<T>()?;
        let loc = self.locations.get(&entity)?;
        self.archetypes[loc.archetype.index()]
            .column::<T>(component)?
            .get(loc.row)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let component = self.registry.bit_of::<T>()?;
        let loc = *self.locations.get(&entity)?;
        self.archetypes[loc.archetype.index()]
            .column_mut::<T>(component)?
            .get_mut(loc.row)
    }

    /// Like [`get_component`](Self::get_component), for callers that know
    /// the component is present.
    ///
    /// # Panics
    /// Panics if the entity is dead or lacks `T`; that is a logic error in
    /// the caller.
    pub fn must_get_component<T: Component>(&self, entity: Entity) -> &T {
        match self.get_component::<T>(entity) {
            Some(value) => value,
            None => panic!("entity {entity} has no {} component", T::NAME),
        }
    }

    /// # Panics
    /// Panics if the entity is dead or lacks `T`.
    pub fn must_get_component_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        match self.get_component_mut::<T>(entity) {
            Some(value) => value,
            None => panic!("entity {entity} has no {} component", T::NAME),
        }
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .bit_of::<T>()
            .is_some_and(|component| self.has(entity, component))
    }

    /// Whether `entity` currently carries the component at bit `component`.
    pub fn has(&self, entity: Entity, component: ComponentId) -> bool {
        self.signature_of(entity)
            .is_some_and(|signature| signature.has(component))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Entities that have a `T`, in archetype-creation then row order.
    ///
    /// A query on a type the registry does not know yields nothing.
    pub fn query<T: Component>(&self) -> Query<'_> {
        let mask = self.registry.bit_of::<T>().map(|b| Bitmask::from_bits([b]));
        self.scan(mask)
    }

    /// Entities that have both an `A` and a `B`.
    pub fn query2<A: Component, B: Component>(&self) -> Query<'_> {
        let mask = self
            .registry
            .bit_of::<A>()
            .zip(self.registry.bit_of::<B>())
            .map(|(a, b)| Bitmask::from_bits([a, b]));
        self.scan(mask)
    }

    /// Entities whose signature is a superset of `mask`.
    pub fn query_mask(&self, mask: &Bitmask) -> Query<'_> {
        self.scan(Some(mask.clone()))
    }

    /// Entities with a `T` whose value satisfies `predicate`.
    pub fn query_with<'w, T, F>(&'w self, predicate: F) -> impl Iterator<Item = Entity> + 'w
    where
        T: Component,
        F: Fn(&T) -> bool + 'w,
    {
        self.query_with_mask::<T, F>(&Bitmask::new(), predicate)
    }

    /// Entities whose signature covers `mask` and a `T`, filtered by
    /// `predicate` on the `T` value. Archetypes outside the mask are
    /// skipped whole.
    pub fn query_with_mask<'w, T, F>(
        &'w self,
        mask: &Bitmask,
        predicate: F,
    ) -> impl Iterator<Item = Entity> + 'w
    where
        T: Component,
        F: Fn(&T) -> bool + 'w,
    {
        let (component, required, candidates) = match self.registry.bit_of::<T>() {
            Some(bit) => (bit, mask.with(bit), self.archetypes_with(bit)),
            None => (0, Bitmask::new(), &[][..]),
        };
        candidates
            .iter()
            .filter_map(move |id| {
                let archetype = self.archetypes.get(id.index())?;
                if !archetype.matches_query(&required) {
                    return None;
                }
                let column = archetype.column::<T>(component)?;
                Some(archetype.entities().iter().zip(column.iter()))
            })
            .flatten()
            .filter(move |&(_, value)| predicate(value))
            .map(|(&entity, _)| entity)
    }

    /// Scan candidates: archetypes holding the mask's least widespread
    /// component, or every archetype for an empty mask.
    fn scan(&self, mask: Option<Bitmask>) -> Query<'_> {
        let candidates = mask.as_ref().and_then(|mask| {
            mask.iter()
                .map(|bit| self.archetypes_with(bit))
                .min_by_key(|ids| ids.len())
        });
        Query::new(&self.archetypes, candidates, mask)
    }

    /// Every `(entity, &T)` pair.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        let component = self.registry.bit_of::<T>();
        self.archetypes
            .iter()
            .filter_map(move |archetype| {
                let column = archetype.column::<T>(component?)?;
                Some(archetype.entities().iter().copied().zip(column.iter()))
            })
            .flatten()
    }

    /// Every `(entity, &A, &B)` triple.
    pub fn iter2<A: Component, B: Component>(&self) -> impl Iterator<Item = (Entity, &A, &B)> + '_ {
        let a = self.registry.bit_of::<A>();
        let b = self.registry.bit_of::<B>();
        self.archetypes
            .iter()
            .filter_map(move |archetype| {
                let first = archetype.column::<A>(a?)?;
                let second = archetype.column::<B>(b?)?;
                Some(
                    archetype
                        .entities()
                        .iter()
                        .zip(first.iter().zip(second.iter()))
                        .map(|(&entity, (a, b))| (entity, a, b)),
                )
            })
            .flatten()
    }

    /// Mutate every `T` in place.
    pub fn for_each_mut<T, F>(&mut self, mut f: F)
    where
        T: Component,
        F: FnMut(Entity, &mut T),
    {
        let Some(component) = self.registry.bit_of::<T>() else {
            return;
        };
        for archetype in &mut self.archetypes {
            if let Some((entities, column)) = archetype.entities_and_column_mut::<T>(component) {
                for (&entity, value) in entities.iter().zip(column.as_mut_slice()) {
                    f(entity, value);
                }
            }
        }
    }

    /// Mutate `A` and `B` together for every entity carrying both.
    pub fn for_each2_mut<A, B, F>(&mut self, mut f: F)
    where
        A: Component,
        B: Component,
        F: FnMut(Entity, &mut A, &mut B),
    {
        let (Some(a), Some(b)) = (self.registry.bit_of::<A>(), self.registry.bit_of::<B>()) else {
            return;
        };
        for archetype in &mut self.archetypes {
            if let Some((entities, first, second)) =
                archetype.entities_and_column_pair_mut::<A, B>(a, b)
            {
                let rows = first.as_mut_slice().iter_mut().zip(second.as_mut_slice());
                for (&entity, (a, b)) in entities.iter().zip(rows) {
                    f(entity, a, b);
                }
            }
        }
    }

    /// Mutate every `T` in place on the rayon pool. Archetypes are visited
    /// one after another; rows within an archetype run in parallel.
    pub fn par_for_each_mut<T, F>(&mut self, f: F)
    where
        T: Component,
        F: Fn(&mut T) + Send + Sync,
    {
        let Some(component) = self.registry.bit_of::<T>() else {
            return;
        };
        for archetype in &mut self.archetypes {
            if let Some(column) = archetype.column_mut::<T>(component) {
                column.as_mut_slice().par_chunks_mut(1024).for_each(|chunk| {
                    for value in chunk {
                        f(value);
                    }
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn bit<T: Component>(&self) -> Result<ComponentId, WorldError> {
        self.registry
            .bit_of::<T>()
            .ok_or(WorldError::ComponentNotRegistered {
                type_name: type_name::<T>(),
            })
    }

    fn location(&self, entity: Entity) -> Result<EntityLoc, WorldError> {
        self.locations
            .get(&entity)
            .copied()
            .ok_or(WorldError::EntityNotFound { entity })
    }

    pub fn location_of(&self, entity: Entity) -> Option<EntityLoc> {
        self.locations.get(&entity).copied()
    }

    pub fn signature_of(&self, entity: Entity) -> Option<&Bitmask> {
        let loc = self.locations.get(&entity)?;
        Some(self.archetypes[loc.archetype.index()].signature())
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes in creation order.
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// Get all archetype IDs that contain a specific component.
    pub fn archetypes_with(&self, component: ComponentId) -> &[ArchetypeId] {
        self.comp_index
            .get(&component)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Archetypes that have ALL of the specified components, in creation order.
    pub fn archetypes_with_all(&self, components: &[ComponentId]) -> Vec<ArchetypeId> {
        let Some((&first, rest)) = components.split_first() else {
            return self.archetypes.iter().map(Archetype::id).collect();
        };

        let mut result: Vec<ArchetypeId> = self.archetypes_with(first).to_vec();
        for &component in rest {
            let archs = self.archetypes_with(component);
            result.retain(|a| archs.contains(a));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    define_component!(Position, "Position");

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    define_component!(Velocity, "Velocity");

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Health {
        value: i32,
    }
    define_component!(Health, "Health");

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default)]
    struct Sprite {
        handle: Option<u32>,
    }

    impl Component for Sprite {
        const NAME: &'static str = "Sprite";

        fn init(&mut self) {
            self.handle = Some(42);
        }

        fn reset(&mut self) {
            if self.handle.take().is_some() {
                RELEASED.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[derive(Debug, Default)]
    struct Unregistered;
    define_component!(Unregistered, "Unregistered");

    fn manager() -> EntityManager {
        let mut registry = ComponentRegistry::new();
        registry.register::<Position>().unwrap();
        registry.register::<Velocity>().unwrap();
        registry.register::<Health>().unwrap();
        registry.register::<Sprite>().unwrap();
        EntityManager::new(Arc::new(registry))
    }

    #[test]
    fn new_entity_lands_in_empty_archetype() {
        let mut world = manager();
        let a = world.new_entity();
        let b = world.new_entity();
        assert!(b.id() > a.id());
        assert_eq!(world.archetype_count(), 1);
        assert!(world.signature_of(a).unwrap().is_empty());
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn add_component_migrates_and_returns_handle() {
        let mut world = manager();
        let e = world.new_entity();
        world.add_component::<Position>(e).unwrap().x = 3.0;
        world.add_component::<Velocity>(e).unwrap();

        let signature = world.signature_of(e).unwrap();
        assert_eq!(signature, &Bitmask::from_bits([0, 1]));
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 3.0, y: 0.0 }));
        assert_eq!(world.archetype_count(), 3);
        for archetype in world.archetypes() {
            archetype.assert_consistent();
        }
    }

    #[test]
    fn adding_twice_keeps_existing_value() {
        let mut world = manager();
        let e = world.new_entity();
        world.add_component::<Health>(e).unwrap().value = 10;
        let again = world.add_component::<Health>(e).unwrap();
        assert_eq!(again.value, 10);
        assert_eq!(world.archetype_count(), 2);
    }

    #[test]
    fn insert_component_overwrites_in_place() {
        let mut world = manager();
        let e = world.new_entity();
        world.insert_component(e, Health { value: 1 }).unwrap();
        let archetypes = world.archetype_count();
        world.insert_component(e, Health { value: 2 }).unwrap();
        assert_eq!(world.archetype_count(), archetypes);
        assert_eq!(world.must_get_component::<Health>(e).value, 2);
    }

    #[test]
    fn remove_component_returns_value_and_restores_others() {
        let mut world = manager();
        let e = world.new_entity();
        world.insert_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
        world.insert_component(e, Velocity { x: 3.0, y: 4.0 }).unwrap();

        let removed = world.remove_component::<Velocity>(e).unwrap();
        assert_eq!(removed, Some(Velocity { x: 3.0, y: 4.0 }));
        assert_eq!(world.remove_component::<Velocity>(e).unwrap(), None);
        assert!(!world.has_component::<Velocity>(e));
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(world.signature_of(e), Some(&Bitmask::from_bits([0])));
    }

    #[test]
    fn migration_repairs_swapped_neighbour() {
        let mut world = manager();
        let entities: Vec<Entity> = (0..3)
            .map(|i| {
                let e = world.new_entity();
                world.insert_component(e, Health { value: i }).unwrap();
                e
            })
            .collect();

        world.add_component::<Position>(entities[0]).unwrap();

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(world.must_get_component::<Health>(e).value, i as i32);
            let loc = world.location_of(e).unwrap();
            let archetype = world.archetype(loc.archetype).unwrap();
            assert_eq!(archetype.entities()[loc.row], e);
        }
    }

    #[test]
    fn despawn_runs_reset_hooks_and_forgets_entity() {
        let mut world = manager();
        let e = world.new_entity();
        let before = RELEASED.load(Ordering::SeqCst);
        assert_eq!(world.add_component::<Sprite>(e).unwrap().handle, Some(42));
        world.despawn(e).unwrap();
        assert!(RELEASED.load(Ordering::SeqCst) > before);
        assert!(!world.is_alive(e));
        assert!(matches!(
            world.despawn(e),
            Err(WorldError::EntityNotFound { .. })
        ));
        assert!(world.get_component::<Sprite>(e).is_none());
    }

    #[test]
    fn usage_errors_are_reported() {
        let mut world = manager();
        let ghost = Entity::from_raw(999);
        assert!(matches!(
            world.add_component::<Position>(ghost),
            Err(WorldError::EntityNotFound { .. })
        ));
        let e = world.new_entity();
        assert!(matches!(
            world.add_component::<Unregistered>(e),
            Err(WorldError::ComponentNotRegistered { .. })
        ));
        assert!(matches!(
            world.insert_boxed(e, 0, Box::new(Health::default())),
            Err(WorldError::TypeMismatch { component: 0, .. })
        ));
        assert!(matches!(
            world.insert_boxed(e, 77, Box::new(Health::default())),
            Err(WorldError::UnknownComponent { component: 77 })
        ));
        assert!(world.signature_of(e).unwrap().is_empty());
    }

    #[test]
    fn construct_then_insert_boxed() {
        let mut world = manager();
        let e = world.new_entity();
        let (bit, value) = world.registry().construct("Sprite").unwrap();
        world.insert_boxed(e, bit, value).unwrap();
        assert_eq!(world.must_get_component::<Sprite>(e).handle, Some(42));

        let (bit, _) = world.registry().construct("Health").unwrap();
        world
            .insert_boxed(e, bit, Box::new(Health { value: 8 }))
            .unwrap();
        assert_eq!(world.get_component::<Health>(e), Some(&Health { value: 8 }));
    }

    #[test]
    #[should_panic(expected = "has no Velocity component")]
    fn must_get_component_panics_when_absent() {
        let mut world = manager();
        let e = world.new_entity();
        world.must_get_component::<Velocity>(e);
    }

    #[test]
    fn queries_follow_superset_rule() {
        let mut world = manager();
        let moving = world.new_entity();
        world.add_component::<Position>(moving).unwrap();
        world.add_component::<Velocity>(moving).unwrap();
        let still = world.new_entity();
        world.add_component::<Position>(still).unwrap();
        let bare = world.new_entity();

        let with_position: Vec<_> = world.query::<Position>().collect();
        assert_eq!(with_position.len(), 2);
        assert!(with_position.contains(&moving) && with_position.contains(&still));
        assert_eq!(world.query2::<Position, Velocity>().collect::<Vec<_>>(), vec![moving]);
        assert_eq!(world.query::<Unregistered>().count(), 0);
        assert_eq!(world.query_mask(&Bitmask::new()).count(), 3);
        assert!(world.query_mask(&Bitmask::new()).any(|e| e == bare));
    }

    #[test]
    fn query_with_filters_on_value() {
        let mut world = manager();
        let hurt = world.new_entity();
        world.insert_component(hurt, Health { value: 5 }).unwrap();
        let fine = world.new_entity();
        world.insert_component(fine, Health { value: 100 }).unwrap();

        let low: Vec<_> = world.query_with::<Health, _>(|h| h.value < 50).collect();
        assert_eq!(low, vec![hurt]);
    }

    #[test]
    fn query_with_mask_requires_the_whole_mask() {
        let mut world = manager();
        let moving = world.new_entity();
        world.insert_component(moving, Position { x: 5.0, y: 0.0 }).unwrap();
        world.add_component::<Velocity>(moving).unwrap();
        let parked = world.new_entity();
        world.insert_component(parked, Position { x: 5.0, y: 0.0 }).unwrap();
        let slow = world.new_entity();
        world.insert_component(slow, Position { x: 0.5, y: 0.0 }).unwrap();
        world.add_component::<Velocity>(slow).unwrap();

        let position = world.registry().require_bit::<Position>().unwrap();
        let velocity = world.registry().require_bit::<Velocity>().unwrap();
        let mask = Bitmask::from_bits([position, velocity]);
        let far: Vec<_> = world
            .query_with_mask::<Position, _>(&mask, |p| p.x > 1.0)
            .collect();
        assert_eq!(far, vec![moving]);

        let velocity_only = Bitmask::from_bits([velocity]);
        let any_far: Vec<_> = world
            .query_with_mask::<Position, _>(&velocity_only, |p| p.x > 1.0)
            .collect();
        assert_eq!(any_far, vec![moving]);
        assert_eq!(
            world.query_with_mask::<Unregistered, _>(&mask, |_| true).count(),
            0
        );
    }

    #[test]
    fn snapshot_then_mutate_during_pass() {
        let mut world = manager();
        for i in 0..8 {
            let e = world.new_entity();
            world.insert_component(e, Health { value: i }).unwrap();
        }
        let doomed: Vec<Entity> = world.query_with::<Health, _>(|h| h.value % 2 == 0).collect();
        for e in doomed {
            world.despawn(e).unwrap();
        }
        assert_eq!(world.query::<Health>().count(), 4);
        assert!(world.iter::<Health>().all(|(_, h)| h.value % 2 == 1));
    }

    #[test]
    fn iteration_helpers_touch_every_match() {
        let mut world = manager();
        for i in 0..3 {
            let e = world.new_entity();
            world.insert_component(e, Position { x: i as f32, y: 0.0 }).unwrap();
            world.insert_component(e, Velocity { x: 1.0, y: 2.0 }).unwrap();
        }
        let lone = world.new_entity();
        world.insert_component(lone, Position::default()).unwrap();

        world.for_each2_mut::<Position, Velocity, _>(|_, p, v| {
            p.x += v.x;
            p.y += v.y;
        });
        world.par_for_each_mut::<Position, _>(|p| p.y *= 2.0);
        world.for_each_mut::<Velocity, _>(|_, v| v.x = 0.0);

        let moved: Vec<_> = world.iter2::<Position, Velocity>().map(|(_, p, _)| *p).collect();
        assert_eq!(
            moved,
            vec![
                Position { x: 1.0, y: 4.0 },
                Position { x: 2.0, y: 4.0 },
                Position { x: 3.0, y: 4.0 },
            ]
        );
        assert_eq!(world.get_component::<Position>(lone), Some(&Position::default()));
        assert!(world.iter::<Velocity>().all(|(_, v)| v.x == 0.0));
    }

    #[test]
    fn reverse_index_lists_archetypes() {
        let mut world = manager();
        let e = world.new_entity();
        world.add_component::<Position>(e).unwrap();
        world.add_component::<Velocity>(e).unwrap();
        let f = world.new_entity();
        world.add_component::<Velocity>(f).unwrap();

        assert_eq!(world.archetypes_with(1).len(), 2);
        let both = world.archetypes_with_all(&[0, 1]);
        assert_eq!(both, vec![world.location_of(e).unwrap().archetype]);
        assert_eq!(world.archetypes_with_all(&[]).len(), world.archetype_count());
    }

    proptest! {
        #[test]
        fn add_then_remove_preserves_other_components(
            values in proptest::collection::vec((any::<i16>(), any::<bool>()), 1..24),
            pick in any::<proptest::sample::Index>(),
        ) {
            let mut world = manager();
            let entities: Vec<Entity> = values
                .iter()
                .map(|&(value, with_position)| {
                    let e = world.new_entity();
                    world.insert_component(e, Health { value: value as i32 }).unwrap();
                    if with_position {
                        world.insert_component(e, Position { x: value as f32, y: 1.0 }).unwrap();
                    }
                    e
                })
                .collect();

            let target = entities[pick.index(entities.len())];
            let signature = world.signature_of(target).unwrap().clone();
            world.add_component::<Velocity>(target).unwrap();
            world.remove_component::<Velocity>(target).unwrap();
            prop_assert_eq!(world.signature_of(target), Some(&signature));

            for (&e, &(value, with_position)) in entities.iter().zip(&values) {
                prop_assert_eq!(
                    world.get_component::<Health>(e).copied(),
                    Some(Health { value: value as i32 })
                );
                let expected = with_position.then(|| Position { x: value as f32, y: 1.0 });
                prop_assert_eq!(world.get_component::<Position>(e).copied(), expected);
                prop_assert_eq!(
                    world.query::<Position>().any(|q| q == e),
                    world.has_component::<Position>(e)
                );
            }
            for archetype in world.archetypes() {
                archetype.assert_consistent();
            }
        }
    }
}
