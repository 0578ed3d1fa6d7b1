//! Pluggable input and output buffers.
//!
//! Output buffers are keyed by `(game, entity, channel)` and hold ordered
//! message queues; input buffers are keyed by `(game, entity)` and hold at
//! most one pending command. Drivers are process-wide singletons picked by
//! name; the active output driver comes from `output.driver`.

pub mod channel;
pub mod local;

pub use channel::{ChannelInputListener, ChannelOutput};
pub use local::{LocalInput, LocalOutput};

use protocol::OutputMessage;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{Error, Result};

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// An output buffer store (or sink, for pub/sub style drivers.)
pub trait OutputDriver: Send + Sync {
    fn name(&self) -> &str;

    /// Number of unfetched messages in one buffer. Pub/sub drivers don't
    /// keep buffers and refuse.
    fn size(&self, game_id: u64, entity: &str, channel: &str) -> Result<usize>;

    /// Appends one message, stamping it with the buffer's next order value.
    /// This must always work, whatever the driver.
    fn push(&self, game_id: u64, entity: &str, channel: &str, content: String);

    /// Pops the oldest unfetched message. Pub/sub drivers refuse.
    fn pop(&self, game_id: u64, entity: &str, channel: &str) -> Result<Option<OutputMessage>>;

    /// Forgets everything belonging to one game.
    fn discard_game(&self, game_id: u64);
}

/// An input buffer store. All operations must be callable from any thread.
pub trait InputDriver: Send + Sync {
    fn name(&self) -> &str;

    /// True while a command is pending for the entity.
    fn is_set(&self, game_id: u64, entity: &str) -> bool;

    /// Stores a pending command, overwriting whatever was there.
    fn set(&self, game_id: u64, entity: &str, command: String);

    /// Drains and returns the pending command, if any.
    fn consume(&self, game_id: u64, entity: &str) -> Option<String>;

    /// Forgets everything belonging to one game.
    fn discard_game(&self, game_id: u64);
}

/// The process-wide driver registry.
///
/// Built-in drivers are registered at construction; extensions may add and
/// remove their own output drivers at load/unload time, never the built-ins.
pub struct Drivers {
    input: Arc<dyn InputDriver>,
    outputs: RwLock<HashMap<String, Arc<dyn OutputDriver>>>,
    builtin_outputs: HashSet<String>,
    active_output: String,
}

impl Drivers {
    /// Builds the registry from the configuration. Fails when
    /// `output.driver` names no known driver.
    pub fn new(config: &Config) -> Result<Arc<Drivers>> {
        let mut outputs: HashMap<String, Arc<dyn OutputDriver>> = HashMap::new();
        let local: Arc<dyn OutputDriver> = Arc::new(LocalOutput::new());
        let channel: Arc<dyn OutputDriver> = Arc::new(ChannelOutput::new(
            config.channel.output_channel.clone(),
            config.channel.capacity,
        ));
        outputs.insert(local.name().to_string(), local);
        outputs.insert(channel.name().to_string(), channel);

        let builtin_outputs = outputs.keys().cloned().collect();
        let active_output = config.output.driver.clone();
        if !outputs.contains_key(&active_output) {
            return Err(Error::Internal(format!(
                "'{active_output}' is not a valid output driver"
            )));
        }

        Ok(Arc::new(Drivers {
            input: Arc::new(LocalInput::new()),
            outputs: RwLock::new(outputs),
            builtin_outputs,
            active_output,
        }))
    }

    pub fn input(&self) -> Arc<dyn InputDriver> {
        Arc::clone(&self.input)
    }

    /// The configured output driver.
    pub fn output(&self) -> Arc<dyn OutputDriver> {
        self.outputs
            .read()
            .unwrap()
            .get(&self.active_output)
            .cloned()
            .expect("the active output driver is validated at construction")
    }

    /// Looks an output driver up by name.
    pub fn output_named(&self, name: &str) -> Result<Arc<dyn OutputDriver>> {
        self.outputs
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("'{name}' is not a valid output driver")))
    }

    /// Registers an extension-provided output driver. Duplicate names fail.
    pub fn register_output(&self, driver: Arc<dyn OutputDriver>) -> Result<()> {
        let mut outputs = self.outputs.write().unwrap();
        let name = driver.name().to_string();
        if outputs.contains_key(&name) {
            return Err(Error::Conflict(format!(
                "output driver '{name}' is already registered"
            )));
        }
        outputs.insert(name, driver);
        Ok(())
    }

    /// Removes an extension-provided output driver. Built-ins stay.
    pub fn unregister_output(&self, name: &str) -> bool {
        if self.builtin_outputs.contains(name) {
            return false;
        }
        self.outputs.write().unwrap().remove(name).is_some()
    }

    /// Drops every buffer a destroyed game left behind.
    pub fn discard_game(&self, game_id: u64) {
        self.input.discard_game(game_id);
        for driver in self.outputs.read().unwrap().values() {
            driver.discard_game(game_id);
        }
    }
}

/// The engine-facing output binding for one game: entity streams are
/// identified by `(game id, entity name)`, so nothing points back into the
/// world.
pub struct DriverSink {
    game_id: u64,
    drivers: Arc<Drivers>,
}

impl tale_engine::OutputSink for DriverSink {
    fn send(&self, entity: &str, channel: &str, content: &str) {
        self.drivers
            .output()
            .push(self.game_id, entity, channel, content.to_string());
    }
}

/// The engine-facing input binding for one game.
pub struct DriverFeed {
    game_id: u64,
    drivers: Arc<Drivers>,
}

impl tale_engine::InputFeed for DriverFeed {
    fn try_consume(&self, entity: &str) -> Option<String> {
        self.drivers.input.consume(self.game_id, entity)
    }
}

/// The I/O pair a hosted game is constructed with.
pub fn bindings_for(game_id: u64, drivers: &Arc<Drivers>) -> tale_engine::IoBindings {
    tale_engine::IoBindings {
        output: Arc::new(DriverSink {
            game_id,
            drivers: Arc::clone(drivers),
        }),
        input: Arc::new(DriverFeed {
            game_id,
            drivers: Arc::clone(drivers),
        }),
    }
}
