//! The `entity` scope and its subtype tree.
//!
//! One controller type serves the whole hierarchy (`entity` down to `room`,
//! `creature` and friends): each instance carries an [`EntityClass`] that
//! decides which entities it sees and how its not-found message reads. The
//! `player` scope wraps an instance of this controller and adds its own
//! actions on top.

use futures_util::future::BoxFuture;
use protocol::{DEFAULT_OUTPUT_CHANNEL, Method, OutputMessage};
use serde_json::{Value, json};
use std::sync::Arc;
use tale_engine::{EntityKind, EntityView};

use crate::container::GameContainer;
use crate::error::{Error, Result};
use crate::request;
use crate::response::Response;
use crate::scopes::{GAME_NOT_FOUND, ScopeController, unmatched};
use crate::wrapper::GameWrapper;

pub const MISSING_ENTITY_NAME: &str = "missing required entity name";
pub const INVALID_ENTITY_NAME: &str = "invalid entity name";
pub const MISSING_CHANNEL: &str = "missing required channel";
pub const INVALID_CHANNEL: &str = "invalid channel";
pub const MISSING_OUTPUT_MESSAGE: &str = "missing required message";
pub const INVALID_OUTPUT_MESSAGE: &str = "message must be a string or other scalar type";

const KNOWN_METHODS: &[Method] = &[Method::Get, Method::Post];

/// One level of the entity hierarchy:
/// entity ⊃ tangible ⊃ {place ⊃ room, thing ⊃ {object, being ⊃ {creature, player}}},
/// with resource directly under entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    Entity,
    Tangible,
    Place,
    Room,
    Thing,
    Object,
    Being,
    Creature,
    Player,
    Resource,
}

impl EntityClass {
    /// Every class in the tree, used to register one scope per level.
    pub const ALL: &'static [EntityClass] = &[
        EntityClass::Entity,
        EntityClass::Tangible,
        EntityClass::Place,
        EntityClass::Room,
        EntityClass::Thing,
        EntityClass::Object,
        EntityClass::Being,
        EntityClass::Creature,
        EntityClass::Player,
        EntityClass::Resource,
    ];

    pub fn scope_name(&self) -> &'static str {
        match self {
            EntityClass::Entity => "entity",
            EntityClass::Tangible => "tangible",
            EntityClass::Place => "place",
            EntityClass::Room => "room",
            EntityClass::Thing => "thing",
            EntityClass::Object => "object",
            EntityClass::Being => "being",
            EntityClass::Creature => "creature",
            EntityClass::Player => "player",
            EntityClass::Resource => "resource",
        }
    }

    /// Whether an entity of the given concrete kind belongs to this class.
    pub fn matches(&self, kind: EntityKind) -> bool {
        match self {
            EntityClass::Entity => true,
            EntityClass::Tangible => kind.is_tangible(),
            EntityClass::Place => kind.is_place(),
            EntityClass::Room => kind == EntityKind::Room,
            EntityClass::Thing => kind.is_thing(),
            EntityClass::Object => kind == EntityKind::Object,
            EntityClass::Being => kind.is_being(),
            EntityClass::Creature => kind == EntityKind::Creature,
            EntityClass::Player => kind == EntityKind::Player,
            EntityClass::Resource => kind == EntityKind::Resource,
        }
    }

    /// The subtype-specific 404 message, e.g. "place not found".
    pub fn not_found(&self) -> String {
        format!("{} not found", self.scope_name())
    }
}

pub struct EntityController {
    class: EntityClass,
    container: Arc<GameContainer>,
}

impl EntityController {
    pub fn new(class: EntityClass, container: Arc<GameContainer>) -> EntityController {
        EntityController { class, container }
    }

    fn entity_to_json(view: &EntityView) -> Value {
        json!({
            "name": view.name,
            "type": view.kind.type_name(),
        })
    }

    /// Parses the `(game_id, name)` pair every entity action takes and looks
    /// the entity up, enforcing this scope's class.
    pub(crate) fn lookup(&self, args: &Value) -> Result<(u64, Arc<GameWrapper>, EntityView)> {
        let (missing_name, invalid_name) = if self.class == EntityClass::Player {
            (
                crate::scopes::player::MISSING_PLAYER_NAME,
                crate::scopes::player::INVALID_PLAYER_NAME,
            )
        } else {
            (MISSING_ENTITY_NAME, INVALID_ENTITY_NAME)
        };

        let game_id = request::game_id(args, "game_id")?;
        let name = request::required_str(args, "name", missing_name, invalid_name)?;

        let wrapper = self
            .container
            .get_game(game_id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let view = wrapper
            .game()
            .entity(name)
            .filter(|view| self.class.matches(view.kind))
            .ok_or_else(|| Error::NotFound(self.class.not_found()))?;

        Ok((game_id, wrapper, view))
    }

    async fn get_entity(&self, args: &Value) -> Result<Response> {
        let (_game_id, _wrapper, view) = self.lookup(args)?;
        Ok(Response::ok().with("entity", Self::entity_to_json(&view)))
    }

    async fn get_list(&self, args: &Value) -> Result<Response> {
        let game_id = request::game_id(args, "game_id")?;
        let wrapper = self
            .container
            .get_game(game_id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let entities: Vec<Value> = wrapper
            .game()
            .entities()
            .iter()
            .filter(|view| self.class.matches(view.kind))
            .map(Self::entity_to_json)
            .collect();

        Ok(Response::ok().with("entities", Value::Array(entities)))
    }

    /// Pops and returns every unfetched message on one channel, oldest
    /// first. A pub/sub output driver cannot serve this and yields 501.
    async fn get_output(&self, args: &Value) -> Result<Response> {
        // The channel is validated before the entity so its error wins.
        let channel = request::required_str(args, "channel", MISSING_CHANNEL, INVALID_CHANNEL)?;
        let (game_id, _wrapper, view) = self.lookup(args)?;

        let driver = self.container.drivers().output();
        let mut messages: Vec<OutputMessage> = Vec::new();
        while let Some(message) = driver.pop(game_id, &view.name, channel)? {
            messages.push(message);
        }

        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"timestamp": m.timestamp, "order": m.order, "content": m.content}))
            .collect();
        Ok(Response::ok().with("messages", Value::Array(messages)))
    }

    /// Appends a message to the entity's output stream on the given channel
    /// (default `notifications`.)
    async fn post_output(&self, args: &Value) -> Result<Response> {
        let channel = request::optional_str(args, "channel", INVALID_CHANNEL)?
            .unwrap_or(DEFAULT_OUTPUT_CHANNEL);

        let message = match args.get("message") {
            None => return Err(Error::Invalid(MISSING_OUTPUT_MESSAGE.to_string())),
            Some(value) => request::scalar_to_string(value)
                .ok_or_else(|| Error::Invalid(INVALID_OUTPUT_MESSAGE.to_string()))?,
        };

        let (_game_id, wrapper, view) = self.lookup(args)?;
        wrapper.game().emit(&view.name, channel, &message)?;
        Ok(Response::ok())
    }
}

impl ScopeController for EntityController {
    fn name(&self) -> &str {
        self.class.scope_name()
    }

    fn resolve<'a>(
        &'a self,
        method: Method,
        action: &'a str,
        args: &'a Value,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let result = match (method, action) {
                (Method::Get, "default") => self.get_entity(args).await,
                (Method::Get, "list") => self.get_list(args).await,
                (Method::Get, "output") => self.get_output(args).await,
                (Method::Post, "output") => self.post_output(args).await,
                _ => return unmatched(KNOWN_METHODS, method, action),
            };
            result.into()
        })
    }
}
