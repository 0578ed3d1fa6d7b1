//! One hosted game: the simulation plus its identity, lifecycle and dumps.
//!
//! Every public operation takes the wrapper's mutex for its full duration,
//! which serializes external mutations of one game against each other. The
//! listener's in-flight commands go through the engine's own locking instead
//! and are never blocked by the wrapper.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tale_engine::{Definition, EntityView, Game};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::{self, Drivers, now_secs};
use crate::listener::InputListener;
use crate::scopes::{DUMPED_GAME_NOT_FOUND, DUMPED_GAME_SLOT_NOT_FOUND};
use crate::state::{self, DumpMeta, Formats};

pub struct GameWrapper {
    id: u64,
    name: String,
    /// Definition filename, never a path.
    definition: String,
    created: u64,
    restored_slot: Option<u64>,
    game: Arc<Game>,
    listener: InputListener,
    /// The fleet-wide player tally, shared with the container.
    players_total: Arc<AtomicU64>,
    config: Arc<Config>,
    formats: Arc<Formats>,
    lock: Mutex<()>,
}

impl GameWrapper {
    /// Creates a game from a definition file (given relative to the
    /// definitions directory.)
    pub fn create(
        id: u64,
        definition_file: &str,
        name: &str,
        meta: &[(String, String)],
        config: Arc<Config>,
        formats: Arc<Formats>,
        drivers: &Arc<Drivers>,
        players_total: Arc<AtomicU64>,
    ) -> Result<GameWrapper> {
        let full_path = config.definitions_path().join(definition_file);
        let definition = Definition::load(&full_path)?;

        let game = Arc::new(Game::new(&definition, io::bindings_for(id, drivers))?);
        for (key, value) in meta {
            game.set_meta(key, value);
        }

        let filename = Path::new(definition_file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| definition_file.to_string());

        Ok(GameWrapper {
            id,
            name: name.to_string(),
            definition: filename,
            created: now_secs(),
            restored_slot: None,
            listener: InputListener::new(Arc::clone(&game)),
            game,
            players_total,
            config,
            formats,
            lock: Mutex::new(()),
        })
    }

    /// Deserialization constructor: re-animates game `id` from its dump
    /// directory, from the given slot or the most recent one.
    pub fn restore(
        id: u64,
        slot: Option<u64>,
        config: Arc<Config>,
        formats: Arc<Formats>,
        drivers: &Arc<Drivers>,
        players_total: Arc<AtomicU64>,
    ) -> Result<GameWrapper> {
        let game_dir = state::game_dir(&config.state_path(), id);
        if !game_dir.is_dir() {
            return Err(Error::NotFound(DUMPED_GAME_NOT_FOUND.to_string()));
        }

        let slots = state::slot_numbers(&game_dir);
        let slot = match slot {
            Some(slot) if slots.contains(&slot) => slot,
            Some(_) => return Err(Error::NotFound(DUMPED_GAME_SLOT_NOT_FOUND.to_string())),
            None => *slots
                .last()
                .ok_or_else(|| Error::NotFound(DUMPED_GAME_NOT_FOUND.to_string()))?,
        };

        let meta = state::read_meta(&game_dir)?;
        let (_timestamp, format_name, payload) = state::read_slot(&game_dir, slot)?;
        let snapshot = formats.get(&format_name)?.deserialize(&payload)?;
        let game = Arc::new(Game::from_snapshot(snapshot, io::bindings_for(id, drivers)));

        Ok(GameWrapper {
            id,
            name: meta.name,
            definition: meta.definition,
            created: meta.created,
            restored_slot: Some(slot),
            listener: InputListener::new(Arc::clone(&game)),
            game,
            players_total,
            config,
            formats,
            lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn restored_slot(&self) -> Option<u64> {
        self.restored_slot
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    pub(crate) fn listener(&self) -> &InputListener {
        &self.listener
    }

    // -- lifecycle -----------------------------------------------------------

    /// Starts the clock and the input listener.
    pub async fn start(&self) {
        let _guard = self.lock.lock().await;
        self.game.start();
        self.listener.start().await;
    }

    /// Stops the input listener and the clock.
    pub async fn stop(&self) {
        let _guard = self.lock.lock().await;
        self.listener.stop().await;
        self.game.stop();
    }

    /// Full teardown on destroy and replace: cancels every player's pending
    /// read, then joins the listener.
    pub async fn shutdown(&self) {
        let _guard = self.lock.lock().await;
        for player in self.game.players() {
            self.listener.unsubscribe(&player, None).await;
        }
        self.listener.stop().await;
        self.game.stop();
    }

    // -- players -------------------------------------------------------------

    pub async fn create_player(&self, name: &str) -> Result<EntityView> {
        let _guard = self.lock.lock().await;

        let view = self.game.create_player(name)?;
        self.listener.subscribe(name).await;
        self.players_total.fetch_add(1, Ordering::SeqCst);
        Ok(view)
    }

    /// Removes a player once their in-flight command (if any) has finished.
    /// The optional farewell reaches the player before removal.
    pub async fn remove_player(&self, name: &str, message: Option<String>) -> Result<()> {
        let _guard = self.lock.lock().await;

        let is_player = self
            .game
            .entity(name)
            .is_some_and(|e| e.kind == tale_engine::EntityKind::Player);
        if !is_player {
            return Err(Error::NotFound(
                crate::scopes::PLAYER_NOT_FOUND.to_string(),
            ));
        }

        let game = Arc::clone(&self.game);
        let players_total = Arc::clone(&self.players_total);
        let player = name.to_string();
        self.listener
            .unsubscribe(
                name,
                Some(Box::new(move || {
                    if game.remove_player(&player, message.as_deref()).is_ok() {
                        players_total.fetch_sub(1, Ordering::SeqCst);
                    }
                })),
            )
            .await;
        Ok(())
    }

    // -- meta ----------------------------------------------------------------

    pub async fn set_meta(&self, key: &str, value: &str) {
        let _guard = self.lock.lock().await;
        self.game.set_meta(key, value);
    }

    pub async fn meta_all(&self) -> std::collections::BTreeMap<String, String> {
        let _guard = self.lock.lock().await;
        self.game.meta_all()
    }

    pub async fn meta(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.game.meta(key)
    }

    // -- dumps ---------------------------------------------------------------

    /// Serializes the game into its next dump slot and returns the slot
    /// number. With state disabled this is a no-op reporting slot 0.
    /// Filesystem writes happen under the wrapper mutex, on purpose: a dump
    /// is a consistent point-in-time picture of the game.
    pub async fn dump(&self) -> Result<u64> {
        let _guard = self.lock.lock().await;

        if !self.config.state.enabled {
            return Ok(0);
        }

        let game_dir = state::game_dir(&self.config.state_path(), self.id);
        let slots = state::slot_numbers(&game_dir);
        let slot = slots.last().map(|s| s + 1).unwrap_or(0);

        // Evict the oldest slots down to the retention limit, counting the
        // slot about to be written.
        let max = self.config.state.max_dumps_per_game;
        let evicted: Vec<u64> = if max > 0 {
            let keep = (max - 1) as usize;
            let surplus = slots.len().saturating_sub(keep);
            slots.iter().take(surplus).copied().collect()
        } else {
            Vec::new()
        };

        state::write_meta(
            &game_dir,
            &DumpMeta {
                id: self.id,
                name: self.name.clone(),
                definition: self.definition.clone(),
                created: self.created,
            },
        )?;

        let codec = self.formats.get(&self.config.state.format)?;
        let payload = codec.serialize(&self.game.snapshot())?;
        state::write_slot(&game_dir, slot, codec.name(), &payload, now_secs())?;

        for old in evicted {
            let dir = state::slot_dir(&self.config.state_path(), self.id, old);
            if let Err(error) = std::fs::remove_dir_all(&dir) {
                tracing::error!(?error, slot = old, game = self.id, "Failed to evict dump slot.");
            }
        }

        Ok(slot)
    }

    pub fn player_count(&self) -> u64 {
        self.game.player_count() as u64
    }
}
