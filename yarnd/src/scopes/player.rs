//! The `player` scope: everything the entity tree offers, plus player
//! lifecycle and input.

use futures_util::future::BoxFuture;
use protocol::Method;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::container::GameContainer;
use crate::error::{Error, Result};
use crate::request;
use crate::response::Response;
use crate::scopes::entity::{EntityClass, EntityController};
use crate::scopes::{ScopeController, unmatched};

pub const MISSING_PLAYER_NAME: &str = "missing required player name";
pub const INVALID_PLAYER_NAME: &str = "invalid player name";
pub const PLAYER_NOT_FOUND: &str = "player not found";
pub const MISSING_COMMAND: &str = "missing required command";
pub const INVALID_COMMAND: &str = "command must be a string";
pub const INVALID_REMOVAL_MESSAGE: &str = "message must be a string";

const KNOWN_METHODS: &[Method] = &[Method::Get, Method::Post, Method::Delete];

/// Player names are identifiers: letters, digits, underscores and hyphens.
fn valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct PlayerController {
    container: Arc<GameContainer>,
    /// Serves the shared entity actions with player-scoped lookups.
    inner: EntityController,
}

impl PlayerController {
    pub fn new(container: Arc<GameContainer>) -> PlayerController {
        PlayerController {
            inner: EntityController::new(EntityClass::Player, Arc::clone(&container)),
            container,
        }
    }

    async fn create_player(&self, args: &Value) -> Result<Response> {
        let game_id = request::game_id(args, "game_id")?;
        let name =
            request::required_str(args, "name", MISSING_PLAYER_NAME, INVALID_PLAYER_NAME)?;
        if !valid_player_name(name) {
            return Err(Error::Invalid(INVALID_PLAYER_NAME.to_string()));
        }

        let view = self.container.create_player(game_id, name).await?;
        Ok(Response::ok().with(
            "player",
            json!({"name": view.name, "type": view.kind.type_name()}),
        ))
    }

    async fn destroy_player(&self, args: &Value) -> Result<Response> {
        let message = request::optional_str(args, "message", INVALID_REMOVAL_MESSAGE)?
            .map(|m| m.to_string());

        // Reuse the scoped lookup so a non-player name 404s as "player not
        // found" before anything is touched.
        let (game_id, _wrapper, view) = self.inner.lookup(args)?;

        self.container
            .remove_player(game_id, &view.name, message)
            .await?;
        Ok(Response::ok())
    }

    /// Writes one command into the player's input buffer; the game's input
    /// listener picks it up from there.
    async fn post_input(&self, args: &Value) -> Result<Response> {
        let command = match args.get("command") {
            None => return Err(Error::Invalid(MISSING_COMMAND.to_string())),
            Some(value) => value
                .as_str()
                .ok_or_else(|| Error::Invalid(INVALID_COMMAND.to_string()))?,
        };

        let (game_id, _wrapper, view) = self.inner.lookup(args)?;

        self.container
            .drivers()
            .input()
            .set(game_id, &view.name, command.to_string());
        Ok(Response::ok())
    }
}

impl ScopeController for PlayerController {
    fn name(&self) -> &str {
        "player"
    }

    fn resolve<'a>(
        &'a self,
        method: Method,
        action: &'a str,
        args: &'a Value,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let result = match (method, action) {
                (Method::Post, "default") => self.create_player(args).await,
                (Method::Post, "input") => self.post_input(args).await,
                (Method::Delete, "default") => self.destroy_player(args).await,
                // The shared entity actions, scoped to players.
                (Method::Get, _) | (Method::Post, "output") => {
                    return self.inner.resolve(method, action, args).await;
                }
                _ => return unmatched(KNOWN_METHODS, method, action),
            };
            result.into()
        })
    }
}
