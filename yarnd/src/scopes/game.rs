//! The `game` scope: fleet-level game management.

use futures_util::future::BoxFuture;
use protocol::Method;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

use crate::container::{GameContainer, STATE_DISABLED};
use crate::error::{Error, Result};
use crate::filter;
use crate::request;
use crate::response::Response;
use crate::scopes::{GAME_NOT_FOUND, ScopeController, unmatched};

pub const MISSING_REQUIRED_NAME: &str = "missing required name";
pub const INVALID_NAME: &str = "game name must be a string";
pub const MISSING_REQUIRED_DEFINITION: &str = "missing required definition path";
pub const INVALID_DEFINITION: &str = "game definition filename must be a string";
pub const DEFINITION_NOT_RELATIVE: &str = "definition path must be relative";
pub const MISSING_META: &str = "missing required meta key, value pairs";
pub const INVALID_META: &str = "meta values cannot be objects or arrays";
pub const INVALID_META_KEYS: &str = "invalid meta keys";
pub const INVALID_DELETE_DUMP_ARG: &str = "delete_dump must be a boolean value";
pub const DUMPED_GAME_NOT_FOUND: &str = "dumped game not found";
pub const INVALID_DUMPED_GAME_SLOT: &str = "game slot must be an unsigned integer";
pub const DUMPED_GAME_SLOT_NOT_FOUND: &str = "game slot not found";

const KNOWN_METHODS: &[Method] = &[Method::Get, Method::Post, Method::Set, Method::Delete];

pub struct GameController {
    container: Arc<GameContainer>,
}

impl GameController {
    pub fn new(container: Arc<GameContainer>) -> GameController {
        GameController { container }
    }

    async fn get_game(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        Ok(Response::ok()
            .with("id", id)
            .with("name", wrapper.name())
            .with("definition", wrapper.definition())
            .with("current_time", wrapper.game().time())
            .with("is_running", wrapper.game().is_running()))
    }

    async fn get_list(&self, args: &Value) -> Result<Response> {
        let include_meta = parse_meta_keys(args, "include_meta")?;
        let filters = match args.get("filters") {
            None => None,
            Some(raw) => Some(filter::parse_union(raw)?),
        };

        let ids = self.container.get_games(filters.as_ref())?;

        let mut games = Vec::new();
        for id in ids {
            // A game may vanish between the index query and here; skip it.
            let Some(wrapper) = self.container.get_game(id) else {
                continue;
            };

            let mut entry = Map::new();
            entry.insert("id".to_string(), Value::from(id));
            entry.insert("name".to_string(), Value::from(wrapper.name()));
            if let Some(keys) = &include_meta {
                for key in keys {
                    let value = wrapper.meta(key).await.unwrap_or_default();
                    entry.insert(key.clone(), Value::from(value));
                }
            }
            games.push(Value::Object(entry));
        }

        Ok(Response::ok().with("games", Value::Array(games)))
    }

    fn get_definitions(&self) -> Result<Response> {
        let root = self.container.config().definitions_path();
        let mut definitions = Vec::new();
        collect_files(&root, &root, &mut definitions)?;
        definitions.sort();

        Ok(Response::ok().with("definitions", definitions))
    }

    async fn get_statistics(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let mut statistics = wrapper.game().statistics();
        if let Some(object) = statistics.as_object_mut() {
            object.remove("status");
        }

        Ok(Response::ok().with("statistics", statistics))
    }

    async fn get_meta(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let keys = parse_meta_keys(args, "meta")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let mut meta = Map::new();
        match keys {
            Some(keys) => {
                for key in keys {
                    let value = wrapper.meta(&key).await.unwrap_or_default();
                    meta.insert(key, Value::from(value));
                }
            }
            None => {
                for (key, value) in wrapper.meta_all().await {
                    meta.insert(key, Value::from(value));
                }
            }
        }

        Ok(Response::ok().with("meta", Value::Object(meta)))
    }

    async fn set_meta(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let Some(Value::Object(pairs)) = args.get("meta") else {
            return Err(Error::Invalid(MISSING_META.to_string()));
        };

        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let mut rendered = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let value = request::scalar_to_string(value)
                .ok_or_else(|| Error::Invalid(INVALID_META.to_string()))?;
            rendered.push((key.clone(), value));
        }

        // Atomic per key; the batch as a whole is not.
        for (key, value) in rendered {
            wrapper.set_meta(&key, &value).await;
        }

        Ok(Response::ok())
    }

    async fn start_game(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        self.container.start_game(id).await?;
        Ok(Response::ok())
    }

    async fn stop_game(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        self.container.stop_game(id).await?;
        Ok(Response::ok())
    }

    async fn get_time(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;
        Ok(Response::ok().with("current_time", wrapper.game().time()))
    }

    async fn get_is_running(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;
        Ok(Response::ok().with("is_running", wrapper.game().is_running()))
    }

    /// With an id: the save slots of that game. Without: every dumped game id.
    async fn get_dump_list(&self, args: &Value) -> Result<Response> {
        match request::optional_u64(args, "id", request::INVALID_GAME_ID)? {
            Some(id) => {
                let slots = self.container.dumped_game_slots(id)?;
                let slots: Vec<Value> = slots
                    .into_iter()
                    .map(|(slot, timestamp)| json!({"slot": slot, "timestamp": timestamp}))
                    .collect();
                Ok(Response::ok().with("slots", Value::Array(slots)))
            }
            None => {
                let ids = self.container.dumped_game_ids()?;
                Ok(Response::ok().with("games", ids))
            }
        }
    }

    /// Read-only details of a dumped game, or of one of its slots.
    async fn get_dump(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let slot = request::optional_u64(args, "slot", INVALID_DUMPED_GAME_SLOT)?;

        let meta = self.container.dumped_game(id)?;
        let mut response = Response::ok()
            .with("id", meta.id)
            .with("name", meta.name)
            .with("definition", meta.definition)
            .with("created", meta.created);

        if let Some(slot) = slot {
            let (timestamp, format) = self.container.dumped_game_slot(id, slot)?;
            response = response
                .with("slot", slot)
                .with("timestamp", timestamp)
                .with("format", format);
        }

        Ok(response)
    }

    async fn dump_game(&self, args: &Value) -> Result<Response> {
        if !self.container.config().state.enabled {
            return Err(Error::Unsupported(STATE_DISABLED.to_string()));
        }

        let id = request::game_id(args, "id")?;
        let wrapper = self
            .container
            .get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))?;

        let slot = wrapper.dump().await?;
        Ok(Response::ok().with("slot", slot))
    }

    async fn restore_game(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let slot = request::optional_u64(args, "slot", INVALID_DUMPED_GAME_SLOT)?;

        let restored = self.container.restore_game(id, slot).await?;
        Ok(Response::ok().with("slot", restored))
    }

    async fn create_game(&self, args: &Value) -> Result<Response> {
        let name = request::required_str(args, "name", MISSING_REQUIRED_NAME, INVALID_NAME)?
            .trim()
            .to_string();
        if name.is_empty() {
            return Err(Error::Invalid(MISSING_REQUIRED_NAME.to_string()));
        }

        let definition = request::required_str(
            args,
            "definition",
            MISSING_REQUIRED_DEFINITION,
            INVALID_DEFINITION,
        )?
        .trim()
        .to_string();
        if Path::new(&definition).is_absolute() {
            return Err(Error::Invalid(DEFINITION_NOT_RELATIVE.to_string()));
        }

        // Any further scalar argument pre-seeds the game's meta.
        let mut meta = Vec::new();
        if let Value::Object(fields) = args {
            for (key, value) in fields {
                if key == "name" || key == "definition" {
                    continue;
                }
                let value = request::scalar_to_string(value)
                    .ok_or_else(|| Error::Invalid(INVALID_META.to_string()))?;
                meta.push((key.clone(), value));
            }
        }

        let id = self.container.create_game(&definition, &name, &meta)?;
        Ok(Response::ok().with("id", id))
    }

    async fn destroy_game(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        let delete_dump =
            request::optional_bool(args, "delete_dump", INVALID_DELETE_DUMP_ARG)?.unwrap_or(true);

        if self.container.get_game(id).is_none() {
            return Err(Error::NotFound(GAME_NOT_FOUND.to_string()));
        }

        self.container.destroy_game(id, delete_dump).await;
        Ok(Response::ok())
    }

    /// Deletes a dumped game's whole history, or one slot of it.
    async fn destroy_dump(&self, args: &Value) -> Result<Response> {
        let id = request::game_id(args, "id")?;
        match request::optional_u64(args, "slot", INVALID_DUMPED_GAME_SLOT)? {
            Some(slot) => self.container.destroy_dump_slot(id, slot)?,
            None => self.container.destroy_dump(id)?,
        }
        Ok(Response::ok())
    }
}

/// Parses an optional array-of-strings argument naming meta keys.
fn parse_meta_keys(args: &Value, key: &str) -> Result<Option<Vec<String>>> {
    match args.get(key) {
        None => Ok(None),
        Some(Value::Array(entries)) => {
            let mut keys = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(name) = entry.as_str() else {
                    return Err(Error::Invalid(INVALID_META_KEYS.to_string()));
                };
                keys.push(name.to_string());
            }
            Ok(Some(keys))
        }
        Some(_) => Err(Error::Invalid(INVALID_META_KEYS.to_string())),
    }
}

/// Collects every file below `directory` as a path relative to `root`.
fn collect_files(root: &Path, directory: &Path, found: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, found)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            found.push(relative.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

impl ScopeController for GameController {
    fn name(&self) -> &str {
        "game"
    }

    fn resolve<'a>(
        &'a self,
        method: Method,
        action: &'a str,
        args: &'a Value,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let result = match (method, action) {
                (Method::Get, "default") => self.get_game(args).await,
                (Method::Get, "list") => self.get_list(args).await,
                (Method::Get, "definitions") => self.get_definitions(),
                (Method::Get, "statistics") => self.get_statistics(args).await,
                (Method::Get, "meta") => self.get_meta(args).await,
                (Method::Get, "time") => self.get_time(args).await,
                (Method::Get, "is_running") => self.get_is_running(args).await,
                (Method::Get, "dumplist") => self.get_dump_list(args).await,
                (Method::Get, "dump") => self.get_dump(args).await,
                (Method::Post, "default") => self.create_game(args).await,
                (Method::Post, "dump") => self.dump_game(args).await,
                (Method::Post, "restore") => self.restore_game(args).await,
                (Method::Set, "meta") => self.set_meta(args).await,
                (Method::Set, "start") => self.start_game(args).await,
                (Method::Set, "stop") => self.stop_game(args).await,
                (Method::Delete, "default") => self.destroy_game(args).await,
                (Method::Delete, "dump") => self.destroy_dump(args).await,
                _ => return unmatched(KNOWN_METHODS, method, action),
            };
            result.into()
        })
    }
}
