//! Archetype scans.
//!
//! A [`Query`] walks every archetype whose signature is a superset of the
//! query mask, in archetype creation order, yielding the entity stored in
//! each row in row order. Candidate archetypes come from the manager's
//! per-component index, so archetypes lacking the query's rarest component
//! are never visited. It holds no state beyond its cursor: calling the query
//! again redoes the scan from the start.
//!
//! # Structural changes while scanning
//!
//! Adding or removing a component migrates the entity: its old row is
//! filled by swap-and-pop and a new row is appended elsewhere. A scan that
//! observed storage while that happened could skip an entity or see one
//! twice. A `Query` borrows the manager immutably, so the compiler rejects
//! mutation during the scan outright. Systems that need to change structure
//! based on what they find collect the ids first and mutate afterwards:
//!
//! ```ignore
//! let expired: Vec<Entity> = world
//!     .query_with::<Lifetime, _>(|life| life.remaining == 0)
//!     .collect();
//! for entity in expired {
//!     world.despawn(entity)?;
//! }
//! ```

use crate::ecs::{Archetype, ArchetypeId, Bitmask, Entity};
use std::iter::FusedIterator;
use std::slice;

/// Lazy, finite sequence of entities matching a component mask.
#[derive(Clone)]
pub struct Query<'w> {
    archetypes: &'w [Archetype],
    candidates: Option<&'w [ArchetypeId]>,
    mask: Option<Bitmask>,
    cursor: usize,
    rows: slice::Iter<'w, Entity>,
}

impl<'w> Query<'w> {
    /// `candidates` restricts the scan to those archetypes (creation order);
    /// `None` visits every archetype. `mask == None` means the query names
    /// an unregistered type and therefore matches nothing.
    pub(crate) fn new(
        archetypes: &'w [Archetype],
        candidates: Option<&'w [ArchetypeId]>,
        mask: Option<Bitmask>,
    ) -> Self {
        Self {
            archetypes,
            candidates,
            mask,
            cursor: 0,
            rows: <&[Entity]>::default().iter(),
        }
    }

    /// The mask being matched, if the query can match anything at all.
    pub fn mask(&self) -> Option<&Bitmask> {
        self.mask.as_ref()
    }

    fn next_candidate(&mut self) -> Option<&'w Archetype> {
        let archetypes = self.archetypes;
        let archetype = match self.candidates {
            Some(ids) => archetypes.get(ids.get(self.cursor)?.index()),
            None => archetypes.get(self.cursor),
        };
        self.cursor += 1;
        archetype
    }

    fn remaining_candidates(&self) -> usize {
        match self.candidates {
            Some(ids) => ids
                .iter()
                .skip(self.cursor)
                .filter_map(|id| self.archetypes.get(id.index()))
                .map(Archetype::len)
                .sum(),
            None => self
                .archetypes
                .iter()
                .skip(self.cursor)
                .map(Archetype::len)
                .sum(),
        }
    }
}

impl Iterator for Query<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        loop {
            if let Some(&entity) = self.rows.next() {
                return Some(entity);
            }
            let archetype = self.next_candidate()?;
            // signature test once per archetype, never per row
            if archetype.matches_query(self.mask.as_ref()?) {
                self.rows = archetype.entities().iter();
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.mask.is_none() {
            return (0, Some(0));
        }
        (self.rows.len(), Some(self.rows.len() + self.remaining_candidates()))
    }
}

impl FusedIterator for Query<'_> {}
