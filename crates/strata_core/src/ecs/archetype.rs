// archetype.rs - Columnar storage for one exact component signature
//
// Every entity sharing a signature lives in the same archetype, one row per
// entity, one column per component. The signature never changes after
// creation: structural change always moves the entity to another archetype.

use crate::ecs::storage::{Column, ComponentBox, ComponentRow, ErasedColumn};
use crate::ecs::{Bitmask, Component, ComponentId, ComponentRegistry, Entity};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Index of an archetype inside its manager, in creation order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchetypeError {
    #[error("entity {entity} is already stored in this archetype")]
    DuplicateEntity { entity: Entity },

    #[error("entity {entity} is not stored in this archetype")]
    NotFound { entity: Entity },

    #[error("value supplied for component {component} is not a {expected}")]
    TypeMismatch {
        component: ComponentId,
        expected: &'static str,
    },

    #[error("component {component} is not part of this archetype's signature")]
    MissingFromSignature { component: ComponentId },

    #[error("signature names component {component}, which is not registered")]
    UnknownColumn { component: ComponentId },
}

/// Storage for all entities of a single signature.
///
/// `entities[row]` owns row `row` of every column and `lookup` is its exact
/// inverse.
pub struct Archetype {
    id: ArchetypeId,
    signature: Bitmask,
    columns: Vec<(ComponentId, Box<dyn ErasedColumn>)>, // sorted by component id
    entities: Vec<Entity>,
    lookup: HashMap<Entity, usize>,
}

impl Archetype {
    /// Create empty storage for `signature`, reserving `capacity` rows.
    pub fn new(
        id: ArchetypeId,
        signature: Bitmask,
        registry: &ComponentRegistry,
        capacity: usize,
    ) -> Result<Self, ArchetypeError> {
        let columns = signature
            .iter()
            .map(|component| {
                registry
                    .info(component)
                    .map(|info| (component, info.new_column(capacity)))
                    .ok_or(ArchetypeError::UnknownColumn { component })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            signature,
            columns,
            entities: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
        })
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn signature(&self) -> &Bitmask {
        &self.signature
    }

    /// Number of stored entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn row_of(&self, entity: Entity) -> Option<usize> {
        self.lookup.get(&entity).copied()
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.lookup.contains_key(&entity)
    }

    /// Component ids of this archetype's columns, ascending.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.columns.iter().map(|(component, _)| *component)
    }

    #[inline]
    fn column_index(&self, component: ComponentId) -> Option<usize> {
        self.columns
            .binary_search_by_key(&component, |(id, _)| *id)
            .ok()
    }

    /// Append a row for `entity`.
    ///
    /// Columns without a supplied value receive a default-constructed one.
    /// Validation happens before any column is touched, so a failed call
    /// leaves the archetype unchanged.
    pub fn add_entity(
        &mut self,
        entity: Entity,
        mut components: ComponentRow,
    ) -> Result<usize, ArchetypeError> {
        if self.lookup.contains_key(&entity) {
            return Err(ArchetypeError::DuplicateEntity { entity });
        }
        for (&component, value) in &components {
            let index = self
                .column_index(component)
                .ok_or(ArchetypeError::MissingFromSignature { component })?;
            let column = &self.columns[index].1;
            if !column.accepts(&**value) {
                return Err(ArchetypeError::TypeMismatch {
                    component,
                    expected: column.element_type_name(),
                });
            }
        }

        for (component, column) in self.columns.iter_mut() {
            match components.remove(&*component) {
                Some(value) => {
                    if column.push_boxed(value).is_err() {
                        panic!("column {component} rejected a value it accepted");
                    }
                }
                None => column.push_default(),
            }
        }

        let row = self.entities.len();
        self.entities.push(entity);
        self.lookup.insert(entity, row);
        Ok(row)
    }

    /// Remove `entity`'s row and hand its values back, keyed by component.
    ///
    /// Swap-and-pop: the last row moves into the vacated slot, so the
    /// entity that used to be last (if any) changes row. Nothing stays
    /// behind in the truncated slot.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<ComponentRow, ArchetypeError> {
        let row = self
            .lookup
            .remove(&entity)
            .ok_or(ArchetypeError::NotFound { entity })?;

        let removed = self
            .columns
            .iter_mut()
            .map(|(component, column)| (*component, column.swap_remove_boxed(row)))
            .collect();

        self.entities.swap_remove(row);
        if let Some(&moved) = self.entities.get(row) {
            self.lookup.insert(moved, row);
        }
        Ok(removed)
    }

    /// Type-erased read access to one component of `entity`.
    pub fn get_component(
        &self,
        entity: Entity,
        component: ComponentId,
    ) -> Option<&(dyn Any + Send + Sync)> {
        let row = self.row_of(entity)?;
        let index = self.column_index(component)?;
        self.columns[index].1.get_any(row)
    }

    /// Type-erased write access to one component of `entity`.
    pub fn get_component_mut(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> Option<&mut (dyn Any + Send + Sync)> {
        let row = self.row_of(entity)?;
        let index = self.column_index(component)?;
        self.columns[index].1.get_any_mut(row)
    }

    pub fn has_component(&self, entity: Entity, component: ComponentId) -> bool {
        self.contains(entity) && self.signature.has(component)
    }

    /// Typed read access to the component stored at `component` for `entity`.
    pub fn get<T: Component>(&self, entity: Entity, component: ComponentId) -> Option<&T> {
        let row = self.row_of(entity)?;
        self.column::<T>(component)?.get(row)
    }

    pub fn get_mut<T: Component>(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> Option<&mut T> {
        let row = self.row_of(entity)?;
        self.column_mut::<T>(component)?.get_mut(row)
    }

    /// Typed column for `component`, if present and of type `T`.
    pub fn column<T: Component>(&self, component: ComponentId) -> Option<&Column<T>> {
        let index = self.column_index(component)?;
        self.columns[index].1.as_any().downcast_ref::<Column<T>>()
    }

    pub fn column_mut<T: Component>(&mut self, component: ComponentId) -> Option<&mut Column<T>> {
        let index = self.column_index(component)?;
        self.columns[index].1.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Rows in order alongside one typed column, for in-place iteration.
    pub fn entities_and_column_mut<T: Component>(
        &mut self,
        component: ComponentId,
    ) -> Option<(&[Entity], &mut Column<T>)> {
        let index = self.column_index(component)?;
        let column = self.columns[index]
            .1
            .as_any_mut()
            .downcast_mut::<Column<T>>()?;
        Some((&self.entities, column))
    }

    /// Borrow two distinct columns mutably at once.
    pub fn column_pair_mut<A: Component, B: Component>(
        &mut self,
        a: ComponentId,
        b: ComponentId,
    ) -> Option<(&mut Column<A>, &mut Column<B>)> {
        self.entities_and_column_pair_mut(a, b)
            .map(|(_, first, second)| (first, second))
    }

    /// Rows in order alongside two distinct typed columns.
    pub fn entities_and_column_pair_mut<A: Component, B: Component>(
        &mut self,
        a: ComponentId,
        b: ComponentId,
    ) -> Option<(&[Entity], &mut Column<A>, &mut Column<B>)> {
        let ia = self.column_index(a)?;
        let ib = self.column_index(b)?;
        if ia == ib {
            return None;
        }
        let (first, second) = if ia < ib {
            let (left, right) = self.columns.split_at_mut(ib);
            (&mut left[ia].1, &mut right[0].1)
        } else {
            let (left, right) = self.columns.split_at_mut(ia);
            (&mut right[0].1, &mut left[ib].1)
        };
        let first = first.as_any_mut().downcast_mut::<Column<A>>()?;
        let second = second.as_any_mut().downcast_mut::<Column<B>>()?;
        Some((&self.entities, first, second))
    }

    /// Overwrite `entity`'s value for `component` in place, returning the
    /// previous value.
    pub fn replace_component(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: ComponentBox,
    ) -> Result<ComponentBox, ArchetypeError> {
        let row = self
            .row_of(entity)
            .ok_or(ArchetypeError::NotFound { entity })?;
        let index = self
            .column_index(component)
            .ok_or(ArchetypeError::MissingFromSignature { component })?;
        let column = &mut self.columns[index].1;
        let expected = column.element_type_name();
        column
            .replace_boxed(row, value)
            .map_err(|_| ArchetypeError::TypeMismatch {
                component,
                expected,
            })
    }

    /// Query predicate: this archetype declares every component in `mask`.
    #[inline]
    pub fn matches_query(&self, mask: &Bitmask) -> bool {
        self.signature.has_all(mask)
    }

    /// Exact signature match, used to pick a migration target.
    #[inline]
    pub fn signature_matches(&self, signature: &Bitmask) -> bool {
        self.signature.equals(signature)
    }

    /// Panic if any column length or lookup entry disagrees with the rows.
    pub fn assert_consistent(&self) {
        for (component, column) in &self.columns {
            assert_eq!(
                column.len(),
                self.entities.len(),
                "column {component} length diverged in archetype {}",
                self.id
            );
        }
        assert_eq!(self.lookup.len(), self.entities.len());
        for (row, entity) in self.entities.iter().enumerate() {
            assert_eq!(self.lookup.get(entity), Some(&row));
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("len", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use proptest::prelude::*;

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
    struct Tag;
    define_component!(Tag, "Tag");

    fn setup() -> (ComponentRegistry, Archetype) {
        let mut registry = ComponentRegistry::new();
        let p = registry.register::<Position>().unwrap();
        let v = registry.register::<Velocity>().unwrap();
        registry.register::<Tag>().unwrap();
        let archetype =
            Archetype::new(ArchetypeId::new(0), Bitmask::from_bits([p, v]), &registry, 4)
                .unwrap();
        (registry, archetype)
    }

    fn row(position: Position) -> ComponentRow {
        let mut row = ComponentRow::new();
        row.insert(0, Box::new(position) as ComponentBox);
        row
    }

    #[test]
    fn add_fills_missing_columns_with_defaults() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(1);
        let row_index = archetype
            .add_entity(e, row(Position { x: 1.0, y: 2.0 }))
            .unwrap();
        assert_eq!(row_index, 0);
        assert_eq!(archetype.get::<Position>(e, 0), Some(&Position { x: 1.0, y: 2.0 }));
        assert_eq!(archetype.get::<Velocity>(e, 1), Some(&Velocity::default()));
        assert!(archetype.has_component(e, 1));
        assert!(!archetype.has_component(e, 2));
        archetype.assert_consistent();
    }

    #[test]
    fn duplicate_entity_is_rejected() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(1);
        archetype.add_entity(e, ComponentRow::new()).unwrap();
        assert_eq!(
            archetype.add_entity(e, ComponentRow::new()),
            Err(ArchetypeError::DuplicateEntity { entity: e })
        );
        assert_eq!(archetype.len(), 1);
    }

    #[test]
    fn foreign_bit_and_wrong_type_leave_storage_untouched() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(1);

        let mut foreign = ComponentRow::new();
        foreign.insert(2, Box::new(Tag) as ComponentBox);
        assert_eq!(
            archetype.add_entity(e, foreign),
            Err(ArchetypeError::MissingFromSignature { component: 2 })
        );

        let mut wrong = ComponentRow::new();
        wrong.insert(1, Box::new(Position::default()) as ComponentBox);
        assert!(matches!(
            archetype.add_entity(e, wrong),
            Err(ArchetypeError::TypeMismatch { component: 1, .. })
        ));

        assert!(archetype.is_empty());
        archetype.assert_consistent();
    }

    #[test]
    fn swap_remove_relocates_last_entity() {
        let (_, mut archetype) = setup();
        let ids: Vec<Entity> = (1..=3).map(Entity::from_raw).collect();
        for (i, &e) in ids.iter().enumerate() {
            let x = i as f32;
            archetype.add_entity(e, row(Position { x, y: x })).unwrap();
        }

        let removed = archetype.remove_entity(ids[0]).unwrap();
        assert_eq!(
            removed[&0].downcast_ref::<Position>(),
            Some(&Position { x: 0.0, y: 0.0 })
        );
        assert_eq!(removed.len(), 2);
        assert_eq!(archetype.row_of(ids[2]), Some(0));
        assert_eq!(archetype.get::<Position>(ids[2], 0), Some(&Position { x: 2.0, y: 2.0 }));
        assert_eq!(archetype.get::<Position>(ids[1], 0), Some(&Position { x: 1.0, y: 1.0 }));
        archetype.assert_consistent();
    }

    #[test]
    fn removing_last_row_and_missing_entity() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(7);
        archetype.add_entity(e, ComponentRow::new()).unwrap();
        archetype.remove_entity(e).unwrap();
        assert!(archetype.is_empty());
        assert_eq!(
            archetype.remove_entity(e).err(),
            Some(ArchetypeError::NotFound { entity: e })
        );
        archetype.assert_consistent();
    }

    #[test]
    fn query_and_signature_predicates() {
        let (_, archetype) = setup();
        assert!(archetype.matches_query(&Bitmask::from_bits([0])));
        assert!(archetype.matches_query(&Bitmask::new()));
        assert!(!archetype.matches_query(&Bitmask::from_bits([0, 2])));
        assert!(archetype.signature_matches(&Bitmask::from_bits([1, 0])));
        assert!(!archetype.signature_matches(&Bitmask::from_bits([0])));
    }

    #[test]
    fn column_pair_mut_borrows_disjoint_columns() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(1);
        archetype.add_entity(e, row(Position { x: 1.0, y: 1.0 })).unwrap();
        {
            let (velocity, position) = archetype
                .column_pair_mut::<Velocity, Position>(1, 0)
                .unwrap();
            velocity.as_mut_slice()[0] = Velocity { x: 0.5, y: 0.5 };
            position.as_mut_slice()[0].x += velocity.as_slice()[0].x;
        }
        assert_eq!(archetype.get::<Position>(e, 0), Some(&Position { x: 1.5, y: 1.0 }));
        assert!(archetype.column_pair_mut::<Position, Position>(0, 0).is_none());
        assert!(archetype.column_pair_mut::<Position, Velocity>(0, 2).is_none());
    }

    #[test]
    fn replace_component_checks_type() {
        let (_, mut archetype) = setup();
        let e = Entity::from_raw(1);
        archetype.add_entity(e, row(Position { x: 1.0, y: 1.0 })).unwrap();
        let old = archetype
            .replace_component(e, 0, Box::new(Position { x: 5.0, y: 5.0 }))
            .unwrap();
        assert_eq!(old.downcast_ref::<Position>(), Some(&Position { x: 1.0, y: 1.0 }));
        assert!(matches!(
            archetype.replace_component(e, 0, Box::new(Velocity::default())),
            Err(ArchetypeError::TypeMismatch { component: 0, .. })
        ));
        assert_eq!(archetype.get::<Position>(e, 0), Some(&Position { x: 5.0, y: 5.0 }));
    }

    #[test]
    fn unknown_signature_bit_fails_construction() {
        let registry = ComponentRegistry::new();
        let result = Archetype::new(ArchetypeId::new(0), Bitmask::from_bits([4]), &registry, 0);
        assert!(matches!(
            result,
            Err(ArchetypeError::UnknownColumn { component: 4 })
        ));
    }

    proptest! {
        #[test]
        fn rows_stay_consistent(ops in proptest::collection::vec((any::<bool>(), 1u64..24), 0..96)) {
            let (_, mut archetype) = setup();
            let mut model: HashMap<Entity, f32> = HashMap::new();
            for (add, raw) in ops {
                let e = Entity::from_raw(raw);
                if add {
                    let x = raw as f32;
                    let result = archetype.add_entity(e, row(Position { x, y: -x }));
                    prop_assert_eq!(result.is_ok(), !model.contains_key(&e));
                    model.insert(e, x);
                } else {
                    let result = archetype.remove_entity(e);
                    prop_assert_eq!(result.is_ok(), model.remove(&e).is_some());
                }
                archetype.assert_consistent();
            }
            prop_assert_eq!(archetype.len(), model.len());
            for (e, x) in model {
                prop_assert_eq!(archetype.get::<Position>(e, 0).copied(), Some(Position { x, y: -x }));
            }
        }
    }
}
