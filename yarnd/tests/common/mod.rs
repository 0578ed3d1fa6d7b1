//! Shared harness for the integration tests: a fully wired daemon (config,
//! drivers, container, dispatcher) on top of a throwaway directory with one
//! definition file, driven straight through the dispatcher.

#![allow(dead_code)]

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use yarnd::config::Config;
use yarnd::container::GameContainer;
use yarnd::dispatcher::Dispatcher;
use yarnd::io::Drivers;
use yarnd::state::Formats;

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

pub const DEFINITION_FILE: &str = "game.json";

const DEFINITION: &str = r#"{
  "title": "The Test Caves",
  "rooms": [
    {
      "name": "start",
      "description": "A small stone room.",
      "exits": {"north": "cave"},
      "contains": ["candle"]
    },
    {"name": "cave", "description": "A damp cave.", "exits": {"south": "start"}}
  ],
  "objects": [{"name": "candle", "description": "A stubby wax candle."}],
  "creatures": [{"name": "troll", "description": "A grumpy troll.", "room": "cave"}],
  "resources": [{"name": "gold", "description": "Glittering gold dust."}]
}"#;

pub struct TestServer {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub drivers: Arc<Drivers>,
    pub container: Arc<GameContainer>,
    pub dispatcher: Arc<Dispatcher>,
}

impl TestServer {
    /// A daemon with state disabled.
    pub fn new(tag: &str) -> TestServer {
        TestServer::with_config(tag, |_| {})
    }

    /// A daemon with the snapshot feature on and the given retention.
    pub fn with_state(tag: &str, max_dumps_per_game: u64) -> TestServer {
        TestServer::with_config(tag, |config| {
            config.state.enabled = true;
            config.state.max_dumps_per_game = max_dumps_per_game;
        })
    }

    /// A daemon with arbitrary config tweaks on top of the test defaults.
    pub fn with_config(tag: &str, tweak: impl FnOnce(&mut Config)) -> TestServer {
        let root = std::env::temp_dir().join(format!(
            "yarnd-test-{tag}-{}-{}",
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::SeqCst)
        ));
        let definitions = root.join("definitions");
        std::fs::create_dir_all(&definitions).unwrap();
        std::fs::write(definitions.join(DEFINITION_FILE), DEFINITION).unwrap();

        let mut config = Config::default();
        config.resources.definitions_path = definitions;
        config.state.save_path = root.join("state");
        tweak(&mut config);
        let config = Arc::new(config);

        TestServer::from_parts(root, config)
    }

    /// Builds a second daemon over an existing root, as if the process had
    /// been restarted.
    pub fn restart(&self) -> TestServer {
        TestServer::from_parts(self.root.clone(), Arc::clone(&self.config))
    }

    fn from_parts(root: PathBuf, config: Arc<Config>) -> TestServer {
        let drivers = Drivers::new(&config).unwrap();
        let formats = Arc::new(Formats::new());
        let container =
            GameContainer::new(Arc::clone(&config), Arc::clone(&drivers), formats);
        let dispatcher = Dispatcher::new(Arc::clone(&container), Arc::clone(&config));

        TestServer {
            root,
            config,
            drivers,
            container,
            dispatcher,
        }
    }

    /// Sends one raw request string through the dispatcher.
    pub async fn request_raw(&self, raw: &str) -> Value {
        let response = self.dispatcher.dispatch("test", raw).await;
        serde_json::from_str(&response).expect("responses are always valid JSON")
    }

    /// Sends one request given as a JSON value.
    pub async fn request(&self, request: Value) -> Value {
        self.request_raw(&request.to_string()).await
    }

    /// Creates a game from the test definition and returns its id.
    pub async fn create_game(&self, name: &str) -> u64 {
        let response = self
            .request(serde_json::json!({
                "method": "post",
                "scope": "game",
                "args": {"name": name, "definition": DEFINITION_FILE}
            }))
            .await;
        assert_eq!(response["status"], 200, "create failed: {response}");
        response["id"].as_u64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn status(response: &Value) -> u64 {
    response["status"].as_u64().expect("status is always present")
}

pub fn message(response: &Value) -> &str {
    response["message"].as_str().unwrap_or("")
}
