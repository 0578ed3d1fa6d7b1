//! A small interactive-fiction engine built to be hosted.
//!
//! One [`Game`] is one independent simulation: a world of rooms, objects,
//! creatures, resources and players, a clock, and a per-player command
//! interpreter. The engine owns no I/O; a host wires each game to an
//! [`OutputSink`] and an [`InputFeed`] (see [`io`]) and drives players by
//! calling [`Game::process_command`]; one call reads and executes exactly
//! one command.
//!
//! All methods take `&self` and are safe to call from several tasks at once;
//! the world sits behind the engine's own lock and the lock is never held
//! across an await or an I/O call.

pub mod definition;
pub mod entity;
pub mod error;
pub mod io;
mod world;

pub use definition::Definition;
pub use entity::{Entity, EntityKind, EntityView};
pub use error::EngineError;
pub use io::{InputFeed, IoBindings, OutputSink};
pub use world::Snapshot;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use world::{Outgoing, World};

/// How often the clock advances game time while the game runs.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How often a pending player read polls its input feed.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The channel command responses and farewell messages are delivered on.
pub const DEFAULT_CHANNEL: &str = "notifications";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Returns the engine's semantic version triple.
pub fn version() -> (u64, u64, u64) {
    let parse = |s: &str| s.parse().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

/// One hosted simulation.
pub struct Game {
    bindings: IoBindings,
    world: Arc<Mutex<World>>,
    /// One-shot cancellation flag per player; raising it resolves that
    /// player's pending read with nothing.
    kill_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    clock: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Game {
    /// Builds a fresh game from a validated definition.
    pub fn new(definition: &Definition, bindings: IoBindings) -> Result<Game, EngineError> {
        definition.validate()?;

        Ok(Game {
            bindings,
            world: Arc::new(Mutex::new(World::from_definition(definition, now_secs()))),
            kill_flags: Mutex::new(HashMap::new()),
            clock: Mutex::new(None),
        })
    }

    /// Re-animates a dumped game. Players present in the snapshot are bound
    /// to the fresh I/O pair; the clock is not restarted here even when the
    /// snapshot was taken from a running game. Callers check
    /// [`Game::is_running`] and call [`Game::start`] themselves.
    pub fn from_snapshot(snapshot: Snapshot, bindings: IoBindings) -> Game {
        let mut kill_flags = HashMap::new();
        for player in snapshot.players() {
            kill_flags.insert(player.name.clone(), Arc::new(AtomicBool::new(false)));
        }

        Game {
            bindings,
            world: Arc::new(Mutex::new(snapshot)),
            kill_flags: Mutex::new(kill_flags),
            clock: Mutex::new(None),
        }
    }

    /// Copies out the complete serializable game state.
    pub fn snapshot(&self) -> Snapshot {
        self.world.lock().unwrap().clone()
    }

    // -- clock ---------------------------------------------------------------

    /// Starts the game clock. Idempotent.
    pub fn start(&self) {
        self.world.lock().unwrap().running = true;

        let mut clock = self.clock.lock().unwrap();
        if clock.is_some() {
            return;
        }

        let world = Arc::clone(&self.world);
        *clock = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                let mut world = world.lock().unwrap();
                if !world.running {
                    break;
                }
                world.time += 1;
            }
        }));
    }

    /// Stops the game clock. Idempotent; pending player reads are untouched.
    pub fn stop(&self) {
        self.world.lock().unwrap().running = false;
        if let Some(handle) = self.clock.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.world.lock().unwrap().running
    }

    /// Current game time in ticks.
    pub fn time(&self) -> u64 {
        self.world.lock().unwrap().time
    }

    /// Unix timestamp of game creation (or of the original creation for a
    /// restored game.)
    pub fn created(&self) -> u64 {
        self.world.lock().unwrap().created
    }

    pub fn title(&self) -> String {
        self.world.lock().unwrap().title.clone()
    }

    // -- meta ----------------------------------------------------------------

    pub fn set_meta(&self, key: &str, value: &str) {
        self.world
            .lock()
            .unwrap()
            .meta
            .insert(key.to_string(), value.to_string());
    }

    pub fn meta(&self, key: &str) -> Option<String> {
        self.world.lock().unwrap().meta.get(key).cloned()
    }

    pub fn meta_all(&self) -> BTreeMap<String, String> {
        self.world.lock().unwrap().meta.clone()
    }

    // -- players -------------------------------------------------------------

    /// Creates a player and drops them into the start room.
    pub fn create_player(&self, name: &str) -> Result<EntityView, EngineError> {
        let view = {
            let mut world = self.world.lock().unwrap();

            if world.entities.contains_key(name) {
                return Err(EngineError::EntityExists(name.to_string()));
            }

            let player = Entity {
                name: name.to_string(),
                kind: EntityKind::Player,
                description: format!("{name}, an adventurer."),
                location: world.start_room.clone(),
                exits: BTreeMap::new(),
            };
            let view = EntityView::from(&player);
            world.entities.insert(name.to_string(), player);
            view
        };

        self.kill_flags
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(AtomicBool::new(false)));

        let title = self.title();
        self.deliver(&[Outgoing {
            entity: name.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            text: format!("Welcome to {title}, {name}!"),
        }]);

        Ok(view)
    }

    /// Removes a player. An optional farewell is delivered on the player's
    /// default channel before anything is torn down.
    pub fn remove_player(&self, name: &str, message: Option<&str>) -> Result<(), EngineError> {
        {
            let world = self.world.lock().unwrap();
            let known = world
                .entities
                .get(name)
                .is_some_and(|e| e.kind == EntityKind::Player);
            if !known {
                return Err(EngineError::PlayerNotFound(name.to_string()));
            }
        }

        if let Some(message) = message {
            self.deliver(&[Outgoing {
                entity: name.to_string(),
                channel: DEFAULT_CHANNEL.to_string(),
                text: message.to_string(),
            }]);
        }

        let mut world = self.world.lock().unwrap();
        world.entities.remove(name);
        world.last_commands.remove(name);
        drop(world);

        self.kill_flags.lock().unwrap().remove(name);
        Ok(())
    }

    /// Names of all current players.
    pub fn players(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .players()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.world.lock().unwrap().players().count()
    }

    /// The last command a player issued, if any. Mostly interesting for
    /// diagnostics and tests.
    pub fn last_command(&self, player: &str) -> Option<String> {
        self.world.lock().unwrap().last_commands.get(player).cloned()
    }

    // -- input ---------------------------------------------------------------

    /// Reads and executes exactly one command for the given player.
    ///
    /// Blocks (polling the input feed) until a command arrives. Returns
    /// `false` without executing anything when the read is killed or the
    /// player is unknown.
    pub async fn process_command(&self, player: &str) -> bool {
        let Some(kill) = self.kill_flags.lock().unwrap().get(player).cloned() else {
            return false;
        };

        let command = loop {
            if kill.swap(false, Ordering::SeqCst) {
                return false;
            }
            if let Some(command) = self.bindings.input.try_consume(player) {
                break command;
            }
            tokio::time::sleep(INPUT_POLL_INTERVAL).await;
        };

        let messages = self.world.lock().unwrap().execute(player, &command);
        self.deliver(&messages);
        true
    }

    /// Resolves the player's pending read (if any) with nothing. The flag is
    /// one-shot: it cancels exactly one read.
    pub fn kill_input(&self, player: &str) {
        if let Some(flag) = self.kill_flags.lock().unwrap().get(player) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    // -- entities ------------------------------------------------------------

    pub fn entity(&self, name: &str) -> Option<EntityView> {
        self.world
            .lock()
            .unwrap()
            .entities
            .get(name)
            .map(EntityView::from)
    }

    pub fn entities(&self) -> Vec<EntityView> {
        self.world
            .lock()
            .unwrap()
            .entities
            .values()
            .map(EntityView::from)
            .collect()
    }

    /// Writes one message through an entity's output stream. The stream
    /// terminates every message with a newline.
    pub fn emit(&self, entity: &str, channel: &str, text: &str) -> Result<(), EngineError> {
        if self.entity(entity).is_none() {
            return Err(EngineError::EntityNotFound(entity.to_string()));
        }

        self.deliver(&[Outgoing {
            entity: entity.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        }]);
        Ok(())
    }

    // -- statistics ----------------------------------------------------------

    /// Opaque per-game statistics, consumed by the hosting layer.
    pub fn statistics(&self) -> serde_json::Value {
        let world = self.world.lock().unwrap();
        serde_json::json!({
            "players": world.players().count(),
            "current_time": world.time,
            "is_running": world.running,
            "created": world.created,
        })
    }

    fn deliver(&self, messages: &[Outgoing]) {
        for message in messages {
            self.bindings
                .output
                .send(&message.entity, &message.channel, &format!("{}\n", message.text));
        }
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        if let Some(handle) = self.clock.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Sink that remembers everything it was handed.
    struct RecordingSink {
        messages: StdMutex<Vec<(String, String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<RecordingSink> {
            Arc::new(RecordingSink {
                messages: StdMutex::new(Vec::new()),
            })
        }

        fn recorded(&self) -> Vec<(String, String, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl OutputSink for RecordingSink {
        fn send(&self, entity: &str, channel: &str, content: &str) {
            self.messages.lock().unwrap().push((
                entity.to_string(),
                channel.to_string(),
                content.to_string(),
            ));
        }
    }

    /// Feed backed by a single shared slot.
    struct SlotFeed {
        slot: StdMutex<Option<String>>,
    }

    impl InputFeed for SlotFeed {
        fn try_consume(&self, _entity: &str) -> Option<String> {
            self.slot.lock().unwrap().take()
        }
    }

    fn test_definition() -> Definition {
        serde_json::from_value(serde_json::json!({
            "title": "test tale",
            "rooms": [
                {"name": "start", "description": "Start.", "exits": {"north": "cave"}},
                {"name": "cave", "description": "A cave."}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn player_names_are_unique() {
        let game = Game::new(&test_definition(), IoBindings::disconnected()).unwrap();

        game.create_player("alice").unwrap();
        assert!(matches!(
            game.create_player("alice"),
            Err(EngineError::EntityExists(_))
        ));
        assert_eq!(game.player_count(), 1);
    }

    #[test]
    fn farewell_is_delivered_before_removal() {
        let sink = RecordingSink::new();
        let bindings = IoBindings {
            output: sink.clone(),
            input: Arc::new(io::EmptyFeed),
        };
        let game = Game::new(&test_definition(), bindings).unwrap();

        game.create_player("alice").unwrap();
        game.remove_player("alice", Some("The server is going down.")).unwrap();

        let recorded = sink.recorded();
        assert_eq!(
            recorded.last().unwrap().2,
            "The server is going down.\n"
        );
        assert!(game.entity("alice").is_none());
    }

    #[tokio::test]
    async fn killed_read_resolves_without_a_command() {
        let game = Arc::new(
            Game::new(&test_definition(), IoBindings::disconnected()).unwrap(),
        );
        game.create_player("alice").unwrap();

        let pending = {
            let game = game.clone();
            tokio::spawn(async move { game.process_command("alice").await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        game.kill_input("alice");

        assert!(!pending.await.unwrap());
        assert_eq!(game.last_command("alice"), None);
    }

    #[tokio::test]
    async fn commands_are_read_from_the_feed_and_executed() {
        let sink = RecordingSink::new();
        let slot = Arc::new(SlotFeed {
            slot: StdMutex::new(None),
        });
        let bindings = IoBindings {
            output: sink.clone(),
            input: slot.clone(),
        };
        let game = Game::new(&test_definition(), bindings).unwrap();
        game.create_player("alice").unwrap();

        *slot.slot.lock().unwrap() = Some("go north".to_string());
        assert!(game.process_command("alice").await);

        assert_eq!(game.last_command("alice").as_deref(), Some("go north"));
        let recorded = sink.recorded();
        assert!(recorded.iter().any(|(_, _, text)| text.contains("You go north")));
    }

    #[tokio::test]
    async fn snapshot_round_trip_preserves_world_state() {
        let game = Game::new(&test_definition(), IoBindings::disconnected()).unwrap();
        game.create_player("alice").unwrap();
        game.set_meta("difficulty", "hard");

        let snapshot = game.snapshot();
        let restored = Game::from_snapshot(snapshot, IoBindings::disconnected());

        assert_eq!(restored.players(), vec!["alice".to_string()]);
        assert_eq!(restored.meta("difficulty").as_deref(), Some("hard"));
        assert_eq!(restored.time(), game.time());
        assert!(!restored.is_running());
    }
}
