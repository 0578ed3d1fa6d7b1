//! The fleet: every hosted game, indexed.
//!
//! The container owns the id -> wrapper map and three indices (all ids,
//! by name prefix, by running state), all behind one short-held index lock.
//! Everything that takes real time (engine calls, filesystem, listener
//! teardown) happens outside that lock, against `Arc`s taken out of it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tale_engine::EntityView;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::{FilterResolver, FilterValue, Union};
use crate::io::Drivers;
use crate::scopes::{DUMPED_GAME_NOT_FOUND, DUMPED_GAME_SLOT_NOT_FOUND, GAME_NOT_FOUND};
use crate::state::{self, DumpMeta, Formats};
use crate::wrapper::GameWrapper;

pub const STATE_DISABLED: &str = "the state feature is disabled";

/// The primary map plus the filter indices, mutated only together.
pub struct ContainerIndex {
    games: BTreeMap<u64, Arc<GameWrapper>>,
    all: BTreeSet<u64>,
    by_name: BTreeMap<String, BTreeSet<u64>>,
    running: HashMap<bool, BTreeSet<u64>>,
    /// Ids of dumped games; never handed out again while state is enabled.
    reserved: BTreeSet<u64>,
}

impl ContainerIndex {
    fn new() -> ContainerIndex {
        ContainerIndex {
            games: BTreeMap::new(),
            all: BTreeSet::new(),
            by_name: BTreeMap::new(),
            running: HashMap::from([(true, BTreeSet::new()), (false, BTreeSet::new())]),
            reserved: BTreeSet::new(),
        }
    }

    fn next_id(&self) -> u64 {
        let highest_live = self.all.last().copied();
        let highest_reserved = self.reserved.last().copied();
        match highest_live.max(highest_reserved) {
            Some(highest) => highest + 1,
            None => 0,
        }
    }

    fn insert(&mut self, wrapper: Arc<GameWrapper>) {
        let id = wrapper.id();
        let running = wrapper.game().is_running();

        self.all.insert(id);
        self.by_name
            .entry(wrapper.name().to_string())
            .or_default()
            .insert(id);
        self.running.entry(running).or_default().insert(id);
        self.running.entry(!running).or_default().remove(&id);
        self.games.insert(id, wrapper);
    }

    fn remove(&mut self, id: u64) -> Option<Arc<GameWrapper>> {
        let wrapper = self.games.remove(&id)?;

        self.all.remove(&id);
        self.running.entry(true).or_default().remove(&id);
        self.running.entry(false).or_default().remove(&id);

        if let Some(ids) = self.by_name.get_mut(wrapper.name()) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_name.remove(wrapper.name());
            }
        }

        Some(wrapper)
    }

    fn reindex_running(&mut self, id: u64, running: bool) {
        self.running.entry(!running).or_default().remove(&id);
        self.running.entry(running).or_default().insert(id);
    }
}

pub struct GameContainer {
    config: Arc<Config>,
    drivers: Arc<Drivers>,
    formats: Arc<Formats>,
    players_total: Arc<AtomicU64>,
    index: Mutex<ContainerIndex>,
    resolver: FilterResolver<ContainerIndex, u64>,
}

impl GameContainer {
    pub fn new(config: Arc<Config>, drivers: Arc<Drivers>, formats: Arc<Formats>) -> Arc<GameContainer> {
        let mut resolver = FilterResolver::new();

        resolver.add_rule("is_running", |index: &ContainerIndex, value| match value {
            FilterValue::Bool(running) => {
                Some(index.running.get(running).cloned().unwrap_or_default())
            }
            _ => None,
        });

        resolver.add_rule("name_starts", |index: &ContainerIndex, value| match value {
            FilterValue::String(prefix) => Some(
                index
                    .by_name
                    .range(prefix.clone()..)
                    .take_while(|(name, _)| name.starts_with(prefix.as_str()))
                    .flat_map(|(_, ids)| ids.iter().copied())
                    .collect(),
            ),
            _ => None,
        });

        let container = GameContainer {
            config,
            drivers,
            formats,
            players_total: Arc::new(AtomicU64::new(0)),
            index: Mutex::new(ContainerIndex::new()),
            resolver,
        };
        container.reserve_dumped_ids();

        Arc::new(container)
    }

    /// Ids already used by dumped games stay reserved, so a fresh process
    /// never re-issues an id that exists on disk.
    fn reserve_dumped_ids(&self) {
        if !self.config.state.enabled {
            return;
        }

        let dumped = state::dumped_game_ids(&self.config.state_path());
        let mut index = self.index.lock().unwrap();
        index.reserved.extend(dumped);
    }

    pub fn size(&self) -> usize {
        self.index.lock().unwrap().all.len()
    }

    pub fn num_players(&self) -> u64 {
        self.players_total.load(Ordering::SeqCst)
    }

    pub fn get_game(&self, id: u64) -> Option<Arc<GameWrapper>> {
        self.index.lock().unwrap().games.get(&id).cloned()
    }

    fn require_game(&self, id: u64) -> Result<Arc<GameWrapper>> {
        self.get_game(id)
            .ok_or_else(|| Error::NotFound(GAME_NOT_FOUND.to_string()))
    }

    // -- creation and destruction --------------------------------------------

    /// Creates a game from a definition file and returns the new id.
    pub fn create_game(
        &self,
        definition: &str,
        name: &str,
        meta: &[(String, String)],
    ) -> Result<u64> {
        // Construction stays under the index lock: id allocation and index
        // insertion have to agree, and nothing in here awaits.
        let mut index = self.index.lock().unwrap();
        let id = index.next_id();

        let wrapper = GameWrapper::create(
            id,
            definition,
            name,
            meta,
            Arc::clone(&self.config),
            Arc::clone(&self.formats),
            &self.drivers,
            Arc::clone(&self.players_total),
        )?;

        index.insert(Arc::new(wrapper));
        Ok(id)
    }

    /// Destroys a live game, waiting out its in-flight commands. Returns
    /// false when the id names no live game.
    pub async fn destroy_game(&self, id: u64, destroy_dump: bool) -> bool {
        let Some(wrapper) = self.index.lock().unwrap().remove(id) else {
            return false;
        };

        // Count after the shutdown: any pending player removal has finished
        // by then and has already adjusted the tally itself.
        wrapper.shutdown().await;
        let players = wrapper.player_count();
        self.players_total.fetch_sub(players, Ordering::SeqCst);
        self.drivers.discard_game(id);

        if destroy_dump && self.config.state.enabled {
            let game_dir = state::game_dir(&self.config.state_path(), id);
            if game_dir.is_dir() {
                if let Err(error) = std::fs::remove_dir_all(&game_dir) {
                    tracing::error!(?error, game = id, "Failed to remove dumped game.");
                }
            }
            self.index.lock().unwrap().reserved.remove(&id);
        }

        true
    }

    // -- lifecycle -----------------------------------------------------------

    pub async fn start_game(&self, id: u64) -> Result<()> {
        let wrapper = self.require_game(id)?;
        wrapper.start().await;
        self.index.lock().unwrap().reindex_running(id, true);
        Ok(())
    }

    pub async fn stop_game(&self, id: u64) -> Result<()> {
        let wrapper = self.require_game(id)?;
        wrapper.stop().await;
        self.index.lock().unwrap().reindex_running(id, false);
        Ok(())
    }

    // -- players -------------------------------------------------------------

    pub async fn create_player(&self, game_id: u64, name: &str) -> Result<EntityView> {
        let wrapper = self.require_game(game_id)?;
        wrapper.create_player(name).await
    }

    pub async fn remove_player(
        &self,
        game_id: u64,
        name: &str,
        message: Option<String>,
    ) -> Result<()> {
        let wrapper = self.require_game(game_id)?;
        wrapper.remove_player(name, message).await
    }

    // -- queries -------------------------------------------------------------

    /// Evaluates a filter union against the indices. No filters means every
    /// game.
    pub fn get_games(&self, filters: Option<&Union>) -> Result<BTreeSet<u64>> {
        let index = self.index.lock().unwrap();
        match filters {
            None => Ok(index.all.clone()),
            Some(union) => self.resolver.resolve(&index, union),
        }
    }

    // -- state ---------------------------------------------------------------

    fn require_state(&self) -> Result<()> {
        if self.config.state.enabled {
            Ok(())
        } else {
            Err(Error::Unsupported(STATE_DISABLED.to_string()))
        }
    }

    /// Dumps every live game. Individual failures are logged and skipped;
    /// with state disabled this does nothing.
    pub async fn dump(&self) {
        if !self.config.state.enabled {
            return;
        }

        let wrappers: Vec<Arc<GameWrapper>> = {
            let index = self.index.lock().unwrap();
            index.games.values().cloned().collect()
        };

        for wrapper in wrappers {
            if let Err(error) = wrapper.dump().await {
                tracing::error!(?error, game = wrapper.id(), "Failed to dump game.");
            }
        }
    }

    /// Restores every dumped game from disk, most recent slot each. Live
    /// games with a dumped id are replaced; other live games stay. Individual
    /// failures are logged and skipped.
    pub async fn restore(&self) -> Result<()> {
        self.require_state()?;

        for id in state::dumped_game_ids(&self.config.state_path()) {
            if let Err(error) = self.restore_game(id, None).await {
                tracing::error!(?error, game = id, "Failed to restore game.");
            }
        }

        Ok(())
    }

    /// Restores one dumped game and returns the slot that was restored.
    pub async fn restore_game(&self, id: u64, slot: Option<u64>) -> Result<u64> {
        self.require_state()?;

        let wrapper = GameWrapper::restore(
            id,
            slot,
            Arc::clone(&self.config),
            Arc::clone(&self.formats),
            &self.drivers,
            Arc::clone(&self.players_total),
        )?;
        let restored_slot = wrapper
            .restored_slot()
            .expect("a restored wrapper knows its slot");
        let was_running = wrapper.game().is_running();
        let players = wrapper.player_count();
        let wrapper = Arc::new(wrapper);

        // A live game under the same id is replaced, dump intact.
        let previous = self.index.lock().unwrap().remove(id);
        if let Some(previous) = previous {
            previous.shutdown().await;
            self.players_total
                .fetch_sub(previous.player_count(), Ordering::SeqCst);
            self.drivers.discard_game(id);
        }

        self.players_total.fetch_add(players, Ordering::SeqCst);
        {
            let mut index = self.index.lock().unwrap();
            index.insert(Arc::clone(&wrapper));
            index.reserved.insert(id);
        }

        if was_running {
            wrapper.start().await;
        }

        Ok(restored_slot)
    }

    /// Gracefully stops every game; called on daemon shutdown.
    pub async fn shutdown(&self) {
        let wrappers: Vec<Arc<GameWrapper>> = {
            let index = self.index.lock().unwrap();
            index.games.values().cloned().collect()
        };
        for wrapper in wrappers {
            wrapper.shutdown().await;
        }
    }

    // -- dumped game queries -------------------------------------------------

    /// Ids of every dumped game on disk, ascending.
    pub fn dumped_game_ids(&self) -> Result<Vec<u64>> {
        self.require_state()?;
        Ok(state::dumped_game_ids(&self.config.state_path()))
    }

    fn require_dump_dir(&self, id: u64) -> Result<std::path::PathBuf> {
        self.require_state()?;
        let game_dir = state::game_dir(&self.config.state_path(), id);
        if !game_dir.is_dir() || state::slot_numbers(&game_dir).is_empty() {
            return Err(Error::NotFound(DUMPED_GAME_NOT_FOUND.to_string()));
        }
        Ok(game_dir)
    }

    /// The identity of a dumped game.
    pub fn dumped_game(&self, id: u64) -> Result<DumpMeta> {
        let game_dir = self.require_dump_dir(id)?;
        state::read_meta(&game_dir)
    }

    /// All `(slot, timestamp)` pairs of a dumped game, ascending by slot.
    pub fn dumped_game_slots(&self, id: u64) -> Result<Vec<(u64, u64)>> {
        let game_dir = self.require_dump_dir(id)?;
        let mut slots = Vec::new();
        for slot in state::slot_numbers(&game_dir) {
            let timestamp = state::slot_timestamp(&game_dir.join(slot.to_string()))?;
            slots.push((slot, timestamp));
        }
        Ok(slots)
    }

    /// Timestamp and format of one dump slot.
    pub fn dumped_game_slot(&self, id: u64, slot: u64) -> Result<(u64, String)> {
        let game_dir = self.require_dump_dir(id)?;
        if !state::slot_numbers(&game_dir).contains(&slot) {
            return Err(Error::NotFound(DUMPED_GAME_SLOT_NOT_FOUND.to_string()));
        }
        let (timestamp, format, _payload) = state::read_slot(&game_dir, slot)?;
        Ok((timestamp, format))
    }

    /// Deletes a game's whole dump history.
    pub fn destroy_dump(&self, id: u64) -> Result<()> {
        let game_dir = self.require_dump_dir(id)?;
        std::fs::remove_dir_all(&game_dir)?;
        self.index.lock().unwrap().reserved.remove(&id);
        Ok(())
    }

    /// Deletes one dump slot.
    pub fn destroy_dump_slot(&self, id: u64, slot: u64) -> Result<()> {
        let game_dir = self.require_dump_dir(id)?;
        if !state::slot_numbers(&game_dir).contains(&slot) {
            return Err(Error::NotFound(DUMPED_GAME_SLOT_NOT_FOUND.to_string()));
        }
        std::fs::remove_dir_all(state::slot_dir(&self.config.state_path(), id, slot))?;
        Ok(())
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn drivers(&self) -> &Arc<Drivers> {
        &self.drivers
    }
}
