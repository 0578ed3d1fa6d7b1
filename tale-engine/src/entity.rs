//! Entities and their type tags.
//!
//! The classic interactive-fiction hierarchy (entity > tangible > place/thing,
//! thing > being, ...) is not modelled with trait objects. Every entity
//! carries an [`EntityKind`] tag and hosts decide type questions through it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The concrete type of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Room,
    Object,
    Creature,
    Player,
    Resource,
}

impl EntityKind {
    /// The type name that is reported on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            EntityKind::Room => "room",
            EntityKind::Object => "object",
            EntityKind::Creature => "creature",
            EntityKind::Player => "player",
            EntityKind::Resource => "resource",
        }
    }

    /// Rooms, objects, creatures and players occupy the world physically.
    /// Resources do not.
    pub fn is_tangible(&self) -> bool {
        !matches!(self, EntityKind::Resource)
    }

    /// A place is somewhere a thing can be.
    pub fn is_place(&self) -> bool {
        matches!(self, EntityKind::Room)
    }

    /// Things are tangibles that are not places.
    pub fn is_thing(&self) -> bool {
        matches!(
            self,
            EntityKind::Object | EntityKind::Creature | EntityKind::Player
        )
    }

    /// Beings act on their own behalf.
    pub fn is_being(&self) -> bool {
        matches!(self, EntityKind::Creature | EntityKind::Player)
    }
}

/// One entity in the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub description: String,
    /// Name of the room (or carrier) this entity is currently in, if any.
    pub location: Option<String>,
    /// Exits by direction, only meaningful for rooms.
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
}

/// Read-only view handed out by the engine.
#[derive(Debug, Clone)]
pub struct EntityView {
    pub name: String,
    pub kind: EntityKind,
    pub description: String,
}

impl From<&Entity> for EntityView {
    fn from(entity: &Entity) -> Self {
        EntityView {
            name: entity.name.clone(),
            kind: entity.kind,
            description: entity.description.clone(),
        }
    }
}
