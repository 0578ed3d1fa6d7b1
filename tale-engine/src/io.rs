//! The contract between the engine and whoever hosts it.
//!
//! The engine never owns sockets or buffers itself. The host hands in one
//! [`OutputSink`] and one [`InputFeed`] per game; both are addressed purely
//! by entity name, so streams carry no reference back into the world and no
//! reference cycles can form. The host side knows which game the pair
//! belongs to.

use std::sync::Arc;

/// Receives every completed output message the game produces.
///
/// The engine terminates each message with a newline before handing it over,
/// so one call equals one line a player would see.
pub trait OutputSink: Send + Sync {
    fn send(&self, entity: &str, channel: &str, content: &str);
}

/// Non-blocking view of the pending command for an entity.
///
/// The engine polls this while a player read is outstanding. Returning
/// `Some` drains the command; the at-most-one-slot semantics live on the
/// host side.
pub trait InputFeed: Send + Sync {
    fn try_consume(&self, entity: &str) -> Option<String>;
}

/// The I/O pair a game is constructed with.
#[derive(Clone)]
pub struct IoBindings {
    pub output: Arc<dyn OutputSink>,
    pub input: Arc<dyn InputFeed>,
}

/// Sink that drops everything. Handy for tests and for tools that only
/// inspect world state.
pub struct NullSink;

impl OutputSink for NullSink {
    fn send(&self, _entity: &str, _channel: &str, _content: &str) {}
}

/// Feed that never yields a command.
pub struct EmptyFeed;

impl InputFeed for EmptyFeed {
    fn try_consume(&self, _entity: &str) -> Option<String> {
        None
    }
}

impl IoBindings {
    /// Bindings that read nothing and write nowhere.
    pub fn disconnected() -> IoBindings {
        IoBindings {
            output: Arc::new(NullSink),
            input: Arc::new(EmptyFeed),
        }
    }
}
