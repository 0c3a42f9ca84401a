//! Entity handles
//!
//! Entities are plain 64-bit identifiers handed out in increasing order by
//! an [`EntityManager`](crate::ecs::EntityManager). An id is never reused
//! while its manager is alive, so a stale handle simply stops resolving.

use crate::ecs::ArchetypeId;
use std::fmt;

/// Entity handle (opaque ID).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u64);

impl Entity {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }

    /// Serialize to 64-bit integer (for networking/save files)
    pub fn to_bits(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Where an entity's row currently lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityLoc {
    pub archetype: ArchetypeId,
    pub row: usize,
}
