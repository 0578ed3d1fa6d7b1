//! The mutable world state and the command interpreter that acts on it.
//!
//! Everything in here is pure data manipulation. Command execution returns
//! the messages it wants delivered instead of writing anywhere, so the world
//! lock is never held across an I/O call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::definition::Definition;
use crate::entity::{Entity, EntityKind};

/// One message produced by command execution, to be delivered by the caller.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub entity: String,
    pub channel: String,
    pub text: String,
}

impl Outgoing {
    fn notify(entity: &str, text: impl Into<String>) -> Outgoing {
        Outgoing {
            entity: entity.to_string(),
            channel: crate::DEFAULT_CHANNEL.to_string(),
            text: text.into(),
        }
    }
}

/// The complete serializable state of one game.
///
/// This doubles as the dump payload: a snapshot is a verbatim copy of the
/// world, re-animated by [`crate::Game::from_snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub(crate) title: String,
    pub(crate) running: bool,
    pub(crate) time: u64,
    pub(crate) created: u64,
    pub(crate) start_room: Option<String>,
    pub(crate) meta: BTreeMap<String, String>,
    pub(crate) entities: BTreeMap<String, Entity>,
    pub(crate) last_commands: BTreeMap<String, String>,
}

pub(crate) type World = Snapshot;

impl World {
    pub(crate) fn from_definition(definition: &Definition, created: u64) -> World {
        let start_room = definition.rooms.first().map(|r| r.name.clone());
        let mut entities = BTreeMap::new();

        for room in &definition.rooms {
            entities.insert(
                room.name.clone(),
                Entity {
                    name: room.name.clone(),
                    kind: EntityKind::Room,
                    description: room.description.clone(),
                    location: None,
                    exits: room.exits.clone(),
                },
            );
        }

        for object in &definition.objects {
            // An object sits in whichever room lists it; unlisted objects
            // start nowhere.
            let location = definition
                .rooms
                .iter()
                .find(|r| r.contains.iter().any(|c| c == &object.name))
                .map(|r| r.name.clone());

            entities.insert(
                object.name.clone(),
                Entity {
                    name: object.name.clone(),
                    kind: EntityKind::Object,
                    description: object.description.clone(),
                    location,
                    exits: BTreeMap::new(),
                },
            );
        }

        for creature in &definition.creatures {
            entities.insert(
                creature.name.clone(),
                Entity {
                    name: creature.name.clone(),
                    kind: EntityKind::Creature,
                    description: creature.description.clone(),
                    location: creature.room.clone().or_else(|| start_room.clone()),
                    exits: BTreeMap::new(),
                },
            );
        }

        for resource in &definition.resources {
            entities.insert(
                resource.name.clone(),
                Entity {
                    name: resource.name.clone(),
                    kind: EntityKind::Resource,
                    description: resource.description.clone(),
                    location: None,
                    exits: BTreeMap::new(),
                },
            );
        }

        World {
            title: definition.title.clone(),
            running: false,
            time: 0,
            created,
            start_room,
            meta: definition.meta.clone(),
            entities,
            last_commands: BTreeMap::new(),
        }
    }

    pub(crate) fn players(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(|e| e.kind == EntityKind::Player)
    }

    /// Runs one player command and returns the messages to deliver.
    pub(crate) fn execute(&mut self, player: &str, line: &str) -> Vec<Outgoing> {
        self.last_commands
            .insert(player.to_string(), line.to_string());

        let trimmed = line.trim();
        let (verb, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (trimmed, ""),
        };

        match verb {
            "" => vec![Outgoing::notify(player, "Huh?")],
            "look" => self.look(player),
            "go" => self.go(player, rest),
            "north" | "south" | "east" | "west" | "up" | "down" => self.go(player, verb),
            "take" => self.take(player, rest),
            "drop" => self.drop(player, rest),
            "say" => self.say(player, rest),
            "wait" => vec![Outgoing::notify(player, "Time passes.")],
            _ => vec![Outgoing::notify(
                player,
                format!("I don't know how to {verb}."),
            )],
        }
    }

    fn player_room(&self, player: &str) -> Option<String> {
        self.entities.get(player).and_then(|p| p.location.clone())
    }

    fn look(&self, player: &str) -> Vec<Outgoing> {
        let Some(room_name) = self.player_room(player) else {
            return vec![Outgoing::notify(player, "You are nowhere at all.")];
        };

        let room = &self.entities[&room_name];
        let mut text = format!("{}\n{}", room.name, room.description);

        let here: Vec<&str> = self
            .entities
            .values()
            .filter(|e| e.location.as_deref() == Some(room_name.as_str()) && e.name != player)
            .map(|e| e.name.as_str())
            .collect();

        if !here.is_empty() {
            text.push_str(&format!("\nYou see: {}.", here.join(", ")));
        }

        vec![Outgoing::notify(player, text)]
    }

    fn go(&mut self, player: &str, direction: &str) -> Vec<Outgoing> {
        if direction.is_empty() {
            return vec![Outgoing::notify(player, "Go where?")];
        }

        let Some(room_name) = self.player_room(player) else {
            return vec![Outgoing::notify(player, "You are nowhere at all.")];
        };

        let Some(destination) = self.entities[&room_name].exits.get(direction).cloned() else {
            return vec![Outgoing::notify(player, "You can't go that way.")];
        };

        if let Some(entity) = self.entities.get_mut(player) {
            entity.location = Some(destination.clone());
        }

        let mut messages = vec![Outgoing::notify(
            player,
            format!("You go {direction}."),
        )];
        messages.extend(self.look(player));
        messages
    }

    fn take(&mut self, player: &str, object: &str) -> Vec<Outgoing> {
        if object.is_empty() {
            return vec![Outgoing::notify(player, "Take what?")];
        }

        let room = self.player_room(player);
        let takeable = self.entities.get(object).is_some_and(|e| {
            e.kind == EntityKind::Object && e.location.is_some() && e.location == room
        });

        if !takeable {
            return vec![Outgoing::notify(
                player,
                format!("There is no {object} here."),
            )];
        }

        self.entities.get_mut(object).unwrap().location = Some(player.to_string());
        vec![Outgoing::notify(player, format!("You take the {object}."))]
    }

    fn drop(&mut self, player: &str, object: &str) -> Vec<Outgoing> {
        if object.is_empty() {
            return vec![Outgoing::notify(player, "Drop what?")];
        }

        let carried = self
            .entities
            .get(object)
            .is_some_and(|e| e.location.as_deref() == Some(player));

        if !carried {
            return vec![Outgoing::notify(
                player,
                format!("You aren't carrying a {object}."),
            )];
        }

        let room = self.player_room(player);
        self.entities.get_mut(object).unwrap().location = room;
        vec![Outgoing::notify(player, format!("You drop the {object}."))]
    }

    fn say(&self, player: &str, words: &str) -> Vec<Outgoing> {
        if words.is_empty() {
            return vec![Outgoing::notify(player, "Say what?")];
        }

        let room = self.player_room(player);
        let mut messages = vec![Outgoing::notify(player, format!("You say: {words}"))];

        for other in self.players() {
            if other.name != player && other.location == room && room.is_some() {
                messages.push(Outgoing::notify(
                    &other.name,
                    format!("{player} says: {words}"),
                ));
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;

    fn two_room_world() -> World {
        let definition: Definition = serde_json::from_value(serde_json::json!({
            "title": "test",
            "rooms": [
                {"name": "start", "description": "Start.", "exits": {"north": "cave"}, "contains": ["candle"]},
                {"name": "cave", "description": "A cave.", "exits": {"south": "start"}}
            ],
            "objects": [{"name": "candle", "description": "A candle."}]
        }))
        .unwrap();

        let mut world = World::from_definition(&definition, 0);
        world.entities.insert(
            "alice".to_string(),
            Entity {
                name: "alice".to_string(),
                kind: EntityKind::Player,
                description: String::new(),
                location: Some("start".to_string()),
                exits: BTreeMap::new(),
            },
        );
        world
    }

    #[test]
    fn movement_follows_exits() {
        let mut world = two_room_world();

        world.execute("alice", "go north");
        assert_eq!(
            world.entities["alice"].location.as_deref(),
            Some("cave")
        );

        let messages = world.execute("alice", "go north");
        assert_eq!(world.entities["alice"].location.as_deref(), Some("cave"));
        assert!(messages[0].text.contains("can't go that way"));
    }

    #[test]
    fn take_and_drop_move_objects() {
        let mut world = two_room_world();

        world.execute("alice", "take candle");
        assert_eq!(
            world.entities["candle"].location.as_deref(),
            Some("alice")
        );

        world.execute("alice", "go north");
        world.execute("alice", "drop candle");
        assert_eq!(world.entities["candle"].location.as_deref(), Some("cave"));
    }

    #[test]
    fn last_command_is_recorded_verbatim() {
        let mut world = two_room_world();
        world.execute("alice", "north");
        assert_eq!(world.last_commands["alice"], "north");
    }
}
