//! The per-game input listener.
//!
//! One coordinator task per game drives every player through the same cycle:
//! read one command from the input buffer, execute it, read the next. The
//! coordinator keeps one [`PlayerTask`] per player and polls it every few
//! milliseconds; at most one command per player is ever in flight, so
//! per-player ordering is strict, while different players of the same game
//! execute concurrently.
//!
//! Teardown is cooperative. `unsubscribe` only marks an entry inactive and
//! resolves the player's pending read; the coordinator notices the finished
//! in-flight task on its next pass, runs the one-shot callback and drops the
//! entry. Nothing here ever blocks a request-serving task.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tale_engine::Game;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long the coordinator sleeps between passes.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs after a player's in-flight command has finished, exactly once.
pub type AfterCommand = Box<dyn FnOnce() + Send>;

struct PlayerTask {
    /// Cleared by `unsubscribe`; an inactive entry is torn down by the
    /// coordinator as soon as its in-flight command has finished.
    active: bool,
    /// True once the first in-flight command has been issued.
    initialized: bool,
    in_flight: Option<JoinHandle<bool>>,
    after_command: Option<AfterCommand>,
}

impl PlayerTask {
    fn new() -> PlayerTask {
        PlayerTask {
            active: true,
            initialized: false,
            in_flight: None,
            after_command: None,
        }
    }

    /// Ready for another pass: never armed, or the last command finished.
    fn ready(&self) -> bool {
        !self.initialized || self.in_flight.as_ref().is_none_or(|h| h.is_finished())
    }
}

pub struct InputListener {
    game: Arc<Game>,
    on: Arc<AtomicBool>,
    tasks: Arc<Mutex<HashMap<String, PlayerTask>>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl InputListener {
    pub fn new(game: Arc<Game>) -> InputListener {
        InputListener {
            game,
            on: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            coordinator: Mutex::new(None),
        }
    }

    /// Starts listening for this player's commands. May be called before or
    /// after `start`.
    pub async fn subscribe(&self, player: &str) {
        self.tasks
            .lock()
            .await
            .insert(player.to_string(), PlayerTask::new());
    }

    /// Stops listening for this player's commands. The pending read (if any)
    /// is resolved empty; the entry itself is removed by the coordinator once
    /// the in-flight command has finished, after which `after_command` runs.
    ///
    /// When the coordinator is not running there is nothing in flight, so
    /// teardown happens inline.
    pub async fn unsubscribe(&self, player: &str, after_command: Option<AfterCommand>) {
        let mut tasks = self.tasks.lock().await;
        self.game.kill_input(player);

        if self.on.load(Ordering::SeqCst) {
            if let Some(entry) = tasks.get_mut(player) {
                entry.active = false;
                entry.after_command = after_command;
                return;
            }
        }

        tasks.remove(player);
        drop(tasks);
        if let Some(callback) = after_command {
            callback();
        }
    }

    /// Launches the coordinator. Idempotent; on first start the task map is
    /// seeded with every player currently in the game.
    pub async fn start(&self) {
        if self.on.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut tasks = self.tasks.lock().await;
            for player in self.game.players() {
                tasks.entry(player).or_insert_with(PlayerTask::new);
            }
        }

        let on = Arc::clone(&self.on);
        let game = Arc::clone(&self.game);
        let tasks = Arc::clone(&self.tasks);

        *self.coordinator.lock().await = Some(tokio::spawn(async move {
            while on.load(Ordering::SeqCst) {
                let mut map = tasks.lock().await;
                let players: Vec<String> = map.keys().cloned().collect();

                for player in players {
                    let Some(entry) = map.get_mut(&player) else {
                        continue;
                    };
                    if !entry.ready() {
                        continue;
                    }

                    if entry.active {
                        let game = Arc::clone(&game);
                        let name = player.clone();
                        entry.in_flight =
                            Some(tokio::spawn(
                                async move { game.process_command(&name).await },
                            ));
                        entry.initialized = true;
                    } else {
                        // The player left. The in-flight command (if any)
                        // has already finished, so joining it is immediate.
                        if let Some(handle) = entry.in_flight.take() {
                            let _ = handle.await;
                        }
                        if let Some(callback) = entry.after_command.take() {
                            callback();
                        }
                        map.remove(&player);
                    }
                }

                drop(map);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }));
    }

    /// Stops the coordinator and joins every in-flight command. Safe to call
    /// when never started, and from game teardown.
    pub async fn stop(&self) {
        if self.on.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.coordinator.lock().await.take() {
                let _ = handle.await;
            }
        }

        let mut tasks = self.tasks.lock().await;

        // Resolve every pending read so the in-flight tasks can finish. The
        // input buffers themselves stay untouched; anything unconsumed is
        // picked up on the next start.
        for (player, entry) in tasks.iter() {
            if entry.in_flight.is_some() {
                self.game.kill_input(player);
            }
        }

        for entry in tasks.values_mut() {
            if let Some(handle) = entry.in_flight.take() {
                let _ = handle.await;
            }
            entry.initialized = false;
        }

        // Finish any teardown the coordinator didn't get to.
        let leaving: Vec<String> = tasks
            .iter()
            .filter(|(_, entry)| !entry.active)
            .map(|(player, _)| player.clone())
            .collect();
        for player in leaving {
            if let Some(mut entry) = tasks.remove(&player) {
                if let Some(callback) = entry.after_command.take() {
                    callback();
                }
            }
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}
