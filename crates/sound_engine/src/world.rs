//! World collaborator interface
//!
//! The sound core never owns entities. It asks the simulation where an entity
//! is, whether it still exists and which region it belongs to.

use crate::foundation::math::Vec3;
use std::fmt;

/// Identifier of a simulation entity that can own sounds
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Get the raw u64 value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a world region (cell) that can be loaded and unloaded
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RegionId(pub u32);

/// Read-only view of the simulation world used by the sound core
pub trait SoundWorld {
    /// Current world position of an entity, `None` if it has no position
    fn position(&self, entity: EntityId) -> Option<Vec3>;

    /// Whether the entity still exists
    fn exists(&self, entity: EntityId) -> bool;

    /// Region the entity currently belongs to
    fn region(&self, entity: EntityId) -> Option<RegionId>;
}

/// A world with no entities, for 2D-only setups such as menus or tools
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyWorld;

impl SoundWorld for EmptyWorld {
    fn position(&self, _entity: EntityId) -> Option<Vec3> {
        None
    }

    fn exists(&self, _entity: EntityId) -> bool {
        false
    }

    fn region(&self, _entity: EntityId) -> Option<RegionId> {
        None
    }
}
