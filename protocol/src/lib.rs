//! The wire vocabulary that is used consistent across the daemon and its clients.
//! Requests and responses are UTF-8 JSON, each frame terminated by a single NUL byte.
//! Also contains the serde types that cross the wire unchanged.

use serde::{Deserialize, Serialize};

/// Terminates every request and every response frame in both directions.
pub const FRAME_DELIMITER: u8 = 0x00;

// Response status codes. These follow the HTTP convention without being HTTP.

/// The request was served.
pub const STATUS_SUCCESS: u16 = 200;
/// The request was malformed or carried a bad argument.
pub const STATUS_INVALID: u16 = 400;
/// The addressed game, entity, dump or scope does not exist.
pub const STATUS_NOT_FOUND: u16 = 404;
/// The request collides with something that already exists (e.g. a taken player name.)
pub const STATUS_CONFLICT: u16 = 409;
/// Something unexpected failed inside the daemon.
pub const STATUS_INTERNAL_ERROR: u16 = 500;
/// The operation is valid but the addressed driver or feature is disabled.
pub const STATUS_UNSUPPORTED: u16 = 501;

// The four envelope keys. Keys are matched case-insensitively.

pub const KEY_METHOD: &str = "method";
pub const KEY_SCOPE: &str = "scope";
pub const KEY_ACTION: &str = "action";
pub const KEY_ARGS: &str = "args";

/// The action that is resolved when a request leaves "action" out.
pub const DEFAULT_ACTION: &str = "default";

/// Output that carries no explicit channel lands here.
pub const DEFAULT_OUTPUT_CHANNEL: &str = "notifications";

/// The five request methods. Method values are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Set,
    Delete,
}

impl Method {
    /// Parses an already lowercased method value.
    pub fn parse(value: &str) -> Option<Method> {
        match value {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "set" => Some(Method::Set),
            "delete" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Set => "set",
            Method::Delete => "delete",
        }
    }
}

/// A semantic version triple, as reported by `global get statistics`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

/// One message held in (or popped from) an entity's output buffer.
///
/// `order` is assigned by the output driver and increases strictly within
/// one `(game, entity, channel)` buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub timestamp: u64,
    pub order: u64,
    pub content: String,
}

/// What the pub/sub output driver publishes for every pushed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedOutput {
    /// The configured stream tag, so one subscriber can fan in several daemons.
    pub stream: String,
    pub game_id: u64,
    pub entity: String,
    pub channel: String,
    pub message: OutputMessage,
}

/// A player command accepted on the pub/sub input stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedCommand {
    pub game_id: u64,
    pub entity: String,
    pub command: String,
}
