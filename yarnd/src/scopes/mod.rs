//! Scope controllers: the request-facing surface of the daemon.
//!
//! Each controller serves one scope and maps `(method, action)` pairs onto
//! handlers. Handlers parse their own arguments, talk to the container and
//! shape a [`Response`]; every error they return is rendered to the wire and
//! none ever escapes.

pub mod entity;
pub mod game;
pub mod global;
pub mod player;

pub use entity::{EntityClass, EntityController};
pub use game::{DUMPED_GAME_NOT_FOUND, DUMPED_GAME_SLOT_NOT_FOUND, GameController};
pub use global::GlobalController;
pub use player::{PLAYER_NOT_FOUND, PlayerController};

use futures_util::future::BoxFuture;
use protocol::{DEFAULT_ACTION, Method, STATUS_NOT_FOUND};
use serde_json::Value;

use crate::response::Response;

pub const METHOD_NOT_FOUND: &str = "method not found";
pub const ACTION_NOT_FOUND: &str = "action not found";
pub const INVALID_ARGUMENTS: &str = "args must be a valid JSON object";
pub const GAME_NOT_FOUND: &str = "game not found";

/// One routing scope. `resolve` owns the full method/action table of the
/// scope, including the not-found responses for unknown entries.
pub trait ScopeController: Send + Sync {
    /// The name this scope is addressed by in requests.
    fn name(&self) -> &str;

    /// Serves one request. `method` and `action` arrive lowercased; a
    /// request without an action arrives as the default action.
    fn resolve<'a>(
        &'a self,
        method: Method,
        action: &'a str,
        args: &'a Value,
    ) -> BoxFuture<'a, Response>;
}

/// The response for a `(method, action)` pair that is not in the table.
/// `known_methods` are the methods the scope serves at all; anything else is
/// a method miss rather than an action miss.
pub(crate) fn unmatched(known_methods: &[Method], method: Method, action: &str) -> Response {
    if !known_methods.contains(&method) {
        return Response::error(STATUS_NOT_FOUND, METHOD_NOT_FOUND);
    }

    if action == DEFAULT_ACTION {
        Response::error(
            STATUS_NOT_FOUND,
            format!("no default action for method {}", method.as_str()),
        )
    } else {
        Response::error(STATUS_NOT_FOUND, ACTION_NOT_FOUND)
    }
}
