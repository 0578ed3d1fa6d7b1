//! Request dispatch.
//!
//! The dispatcher validates the envelope, picks a scope controller and hands
//! the request over. The request format is based loosely on HTTP REST:
//!
//! ```json
//! {"method": "get", "scope": "game", "action": "list", "args": {...}}
//! ```
//!
//! `method`, `scope` and `action` values and all envelope keys are matched
//! case-insensitively; every other string is case-sensitive. A missing
//! action means the scope's default action. Whatever goes wrong, the caller
//! gets a JSON object with a status and a message, never an error.

use futures_util::FutureExt;
use protocol::{
    DEFAULT_ACTION, KEY_ACTION, KEY_ARGS, KEY_METHOD, KEY_SCOPE, Method, STATUS_INTERNAL_ERROR,
    STATUS_INVALID, STATUS_NOT_FOUND,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::container::GameContainer;
use crate::error::{Error, INTERNAL_ERROR_MSG, Result};
use crate::response::Response;
use crate::scopes::{
    EntityClass, EntityController, GameController, GlobalController, INVALID_ARGUMENTS,
    PlayerController, ScopeController,
};

pub const INVALID_JSON: &str = "request must be valid JSON";
pub const MISSING_METHOD: &str = "missing required method";
pub const INVALID_METHOD: &str = "invalid method";
pub const MISSING_SCOPE: &str = "missing required scope";
pub const INVALID_SCOPE: &str = "invalid scope";
pub const SCOPE_NOT_FOUND: &str = "scope not found";
pub const INVALID_ACTION: &str = "invalid action";

pub struct Dispatcher {
    scopes: RwLock<HashMap<String, Arc<dyn ScopeController>>>,
    /// Built-in scopes can never be unregistered; extension scopes can.
    builtins: HashSet<String>,
}

impl Dispatcher {
    /// Builds a dispatcher with every built-in scope registered: `global`,
    /// `game`, and the entity tree including `player`.
    pub fn new(container: Arc<GameContainer>, config: Arc<Config>) -> Arc<Dispatcher> {
        let mut scopes: HashMap<String, Arc<dyn ScopeController>> = HashMap::new();

        let mut add = |controller: Arc<dyn ScopeController>| {
            scopes.insert(controller.name().to_string(), controller);
        };

        add(Arc::new(GlobalController::new(
            Arc::clone(&container),
            config,
        )));
        add(Arc::new(GameController::new(Arc::clone(&container))));
        for class in EntityClass::ALL {
            if *class == EntityClass::Player {
                add(Arc::new(PlayerController::new(Arc::clone(&container))));
            } else {
                add(Arc::new(EntityController::new(
                    *class,
                    Arc::clone(&container),
                )));
            }
        }

        let builtins = scopes.keys().cloned().collect();
        Arc::new(Dispatcher {
            scopes: RwLock::new(scopes),
            builtins,
        })
    }

    /// Registers a scope. Fails when a scope of the same name exists.
    pub fn register_scope(&self, controller: Arc<dyn ScopeController>) -> Result<()> {
        let mut scopes = self.scopes.write().unwrap();
        let name = controller.name().to_string();
        if scopes.contains_key(&name) {
            return Err(Error::Conflict(format!(
                "scope '{name}' is already registered"
            )));
        }
        scopes.insert(name, controller);
        Ok(())
    }

    /// Unregisters a scope. Built-ins and unknown names are refused.
    pub fn unregister_scope(&self, name: &str) -> bool {
        if self.builtins.contains(name) {
            return false;
        }
        self.scopes.write().unwrap().remove(name).is_some()
    }

    /// Serves one framed request string and returns the response, logging
    /// the outcome against the client host.
    pub async fn dispatch(&self, host: &str, request: &str) -> String {
        let response = self.handle(request).await;

        match &response.message {
            Some(message) => {
                tracing::info!(host, status = response.status, message, "Request served.")
            }
            None => tracing::info!(host, status = response.status, "Request served."),
        }

        response.to_value().to_string()
    }

    async fn handle(&self, request: &str) -> Response {
        let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(request) else {
            return Response::error(STATUS_INVALID, INVALID_JSON);
        };
        let envelope = &envelope;

        let method = match parse_component(envelope, KEY_METHOD, MISSING_METHOD, INVALID_METHOD) {
            Ok(method) => method,
            Err(error) => return error.into(),
        };
        let Some(method) = Method::parse(&method) else {
            return Response::error(STATUS_INVALID, INVALID_METHOD);
        };

        let scope = match parse_component(envelope, KEY_SCOPE, MISSING_SCOPE, INVALID_SCOPE) {
            Ok(scope) => scope,
            Err(error) => return error.into(),
        };

        let controller = {
            let scopes = self.scopes.read().unwrap();
            scopes.get(&scope).cloned()
        };
        let Some(controller) = controller else {
            return Response::error(STATUS_NOT_FOUND, SCOPE_NOT_FOUND);
        };

        let action = match find_key(envelope, KEY_ACTION) {
            None => DEFAULT_ACTION.to_string(),
            Some(value) => match value.as_str() {
                Some(action) if !action.trim().is_empty() => action.to_lowercase(),
                Some(_) => DEFAULT_ACTION.to_string(),
                None => return Response::error(STATUS_INVALID, INVALID_ACTION),
            },
        };

        let args = match find_key(envelope, KEY_ARGS) {
            None => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => return Response::error(STATUS_INVALID, INVALID_ARGUMENTS),
        };

        // A handler that panics must still leave the caller with a response.
        let resolved = std::panic::AssertUnwindSafe(controller.resolve(method, &action, &args))
            .catch_unwind()
            .await;
        match resolved {
            Ok(response) => response,
            Err(_) => Response::error(STATUS_INTERNAL_ERROR, INTERNAL_ERROR_MSG),
        }
    }
}

/// Envelope keys are case-insensitive.
fn find_key<'a>(envelope: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    envelope
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

/// Extracts a lowercased string component of the envelope.
fn parse_component(
    envelope: &Map<String, Value>,
    key: &str,
    missing: &str,
    invalid: &str,
) -> Result<String> {
    match find_key(envelope, key) {
        None => Err(Error::Invalid(missing.to_string())),
        Some(value) => value
            .as_str()
            .map(|s| s.to_lowercase())
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}
