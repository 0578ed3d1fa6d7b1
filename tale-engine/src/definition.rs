//! Game definitions. A definition file is a JSON description of the static
//! world a game starts from: rooms with exits and contents, objects,
//! creatures, resources and initial meta data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Direction -> destination room name.
    #[serde(default)]
    pub exits: BTreeMap<String, String>,
    /// Names of objects placed in this room at game start.
    #[serde(default)]
    pub contains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Room the creature starts in. Defaults to the first room.
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A parsed game definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub rooms: Vec<RoomDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub creatures: Vec<CreatureDef>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

fn default_title() -> String {
    "an untitled tale".to_string()
}

impl Definition {
    /// Reads and validates a definition file.
    pub fn load(path: &Path) -> Result<Definition, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        let definition: Definition = serde_json::from_str(&raw)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Every name must be unique, room contents must name defined objects and
    /// exits must lead to defined rooms.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut names = BTreeSet::new();

        let all_names = self
            .rooms
            .iter()
            .map(|r| &r.name)
            .chain(self.objects.iter().map(|o| &o.name))
            .chain(self.creatures.iter().map(|c| &c.name))
            .chain(self.resources.iter().map(|r| &r.name));

        for name in all_names {
            if name.trim().is_empty() {
                return Err(EngineError::DefinitionInvalid(
                    "entity names cannot be empty".to_string(),
                ));
            }
            if !names.insert(name.clone()) {
                return Err(EngineError::DefinitionInvalid(format!(
                    "duplicate entity name '{name}'"
                )));
            }
        }

        let room_names: BTreeSet<&str> = self.rooms.iter().map(|r| r.name.as_str()).collect();
        let object_names: BTreeSet<&str> = self.objects.iter().map(|o| o.name.as_str()).collect();

        for room in &self.rooms {
            for (direction, destination) in &room.exits {
                if !room_names.contains(destination.as_str()) {
                    return Err(EngineError::DefinitionInvalid(format!(
                        "room '{}' exit '{direction}' leads to unknown room '{destination}'",
                        room.name
                    )));
                }
            }
            for content in &room.contains {
                if !object_names.contains(content.as_str()) {
                    return Err(EngineError::DefinitionInvalid(format!(
                        "room '{}' contains unknown object '{content}'",
                        room.name
                    )));
                }
            }
        }

        for creature in &self.creatures {
            if let Some(room) = &creature.room {
                if !room_names.contains(room.as_str()) {
                    return Err(EngineError::DefinitionInvalid(format!(
                        "creature '{}' starts in unknown room '{room}'",
                        creature.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Definition {
        serde_json::from_value(serde_json::json!({
            "title": "test tale",
            "rooms": [
                {"name": "start", "description": "A bare room.", "contains": ["candle"]}
            ],
            "objects": [
                {"name": "candle", "description": "A wax candle."}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn minimal_definition_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut definition = minimal();
        definition.objects.push(ObjectDef {
            name: "start".to_string(),
            description: String::new(),
        });

        assert!(matches!(
            definition.validate(),
            Err(EngineError::DefinitionInvalid(_))
        ));
    }

    #[test]
    fn dangling_exits_are_rejected() {
        let mut definition = minimal();
        definition.rooms[0]
            .exits
            .insert("north".to_string(), "nowhere".to_string());

        assert!(matches!(
            definition.validate(),
            Err(EngineError::DefinitionInvalid(_))
        ));
    }
}
