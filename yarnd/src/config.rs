//! Daemon configuration.
//!
//! Settings live in a JSON file (`yarnd.json` by convention), every option
//! has a hardcoded default and every option can be overridden through a
//! `YARND_`-prefixed environment variable (`network.port` becomes
//! `YARND_NETWORK_PORT`). The loaded [`Config`] is read-only for the rest of
//! the process lifetime and is shared behind an `Arc`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings that never leave the process, e.g. through `global get config`.
/// Server-side filesystem layout is nobody's business on the wire.
pub const HIDDEN_SETTINGS: &[&str] = &[
    "resources.definitions_path",
    "state.save_path",
    "extensions.path",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config value '{0}' is invalid")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub port: u16,
    pub listen: Vec<String>,
    pub reuse_address: bool,
    pub send_keepalive: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        NetworkSection {
            port: 1040,
            listen: vec!["127.0.0.1".to_string(), "::1".to_string()],
            reuse_address: true,
            send_keepalive: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `stdout`, `stderr` or a file path.
    pub logto: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            logto: "stderr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Input listeners to start, e.g. `["channel"]`.
    pub listeners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// `local` or `channel`.
    pub driver: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        OutputSection {
            driver: "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// Broadcast buffer size of the pub/sub driver.
    pub capacity: usize,
    /// Stream tag attached to published output.
    pub output_channel: String,
    /// Stream tag accepted on the input side.
    pub input_channel: String,
}

impl Default for ChannelSection {
    fn default() -> Self {
        ChannelSection {
            capacity: 256,
            output_channel: "yarnd:out".to_string(),
            input_channel: "yarnd:in".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesSection {
    pub definitions_path: PathBuf,
}

impl Default for ResourcesSection {
    fn default() -> Self {
        ResourcesSection {
            definitions_path: PathBuf::from("share/yarnd"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub enabled: bool,
    pub auto_restore: bool,
    pub dump_on_shutdown: bool,
    pub crash_recovery: bool,
    /// Name of the serialization format games are dumped in.
    pub format: String,
    pub save_path: PathBuf,
    /// 0 means unlimited.
    pub max_dumps_per_game: u64,
}

impl Default for StateSection {
    fn default() -> Self {
        StateSection {
            enabled: false,
            auto_restore: false,
            dump_on_shutdown: false,
            crash_recovery: false,
            format: "json".to_string(),
            save_path: PathBuf::from("var/yarnd/state"),
            max_dumps_per_game: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsSection {
    pub path: PathBuf,
}

impl Default for ExtensionsSection {
    fn default() -> Self {
        ExtensionsSection {
            path: PathBuf::from("lib/yarnd"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkSection,
    pub logging: LoggingSection,
    pub input: InputSection,
    pub output: OutputSection,
    pub channel: ChannelSection,
    pub resources: ResourcesSection,
    pub state: StateSection,
    pub extensions: ExtensionsSection,

    /// Root that relative paths resolve against. Not a file setting; comes
    /// from `YARND_INSTALL_PREFIX`.
    #[serde(skip)]
    install_prefix: PathBuf,
}

impl Config {
    /// Loads the given config file (or plain defaults when `None`), then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };

        config.install_prefix = std::env::var("YARND_INSTALL_PREFIX")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/"));

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(raw) = env_value("network.port") {
            self.network.port = parse_number(&raw, "network.port")?;
        }
        if let Some(raw) = env_value("network.listen") {
            self.network.listen = parse_list(&raw, "network.listen")?;
        }
        if let Some(raw) = env_value("network.reuse_address") {
            self.network.reuse_address = parse_bool(&raw, "network.reuse_address")?;
        }
        if let Some(raw) = env_value("network.send_keepalive") {
            self.network.send_keepalive = parse_bool(&raw, "network.send_keepalive")?;
        }
        if let Some(raw) = env_value("logging.logto") {
            self.logging.logto = raw;
        }
        if let Some(raw) = env_value("input.listeners") {
            self.input.listeners = parse_list(&raw, "input.listeners")?;
        }
        if let Some(raw) = env_value("output.driver") {
            self.output.driver = raw;
        }
        if let Some(raw) = env_value("channel.capacity") {
            self.channel.capacity = parse_number(&raw, "channel.capacity")?;
        }
        if let Some(raw) = env_value("channel.output_channel") {
            self.channel.output_channel = raw;
        }
        if let Some(raw) = env_value("channel.input_channel") {
            self.channel.input_channel = raw;
        }
        if let Some(raw) = env_value("resources.definitions_path") {
            self.resources.definitions_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_value("state.enabled") {
            self.state.enabled = parse_bool(&raw, "state.enabled")?;
        }
        if let Some(raw) = env_value("state.auto_restore") {
            self.state.auto_restore = parse_bool(&raw, "state.auto_restore")?;
        }
        if let Some(raw) = env_value("state.dump_on_shutdown") {
            self.state.dump_on_shutdown = parse_bool(&raw, "state.dump_on_shutdown")?;
        }
        if let Some(raw) = env_value("state.crash_recovery") {
            self.state.crash_recovery = parse_bool(&raw, "state.crash_recovery")?;
        }
        if let Some(raw) = env_value("state.format") {
            self.state.format = raw;
        }
        if let Some(raw) = env_value("state.save_path") {
            self.state.save_path = PathBuf::from(raw);
        }
        if let Some(raw) = env_value("state.max_dumps_per_game") {
            self.state.max_dumps_per_game = parse_number(&raw, "state.max_dumps_per_game")?;
        }
        if let Some(raw) = env_value("extensions.path") {
            self.extensions.path = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Converts a relative path to an absolute one below the install prefix;
    /// absolute paths pass through unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.install_prefix.join(path)
        }
    }

    pub fn definitions_path(&self) -> PathBuf {
        self.resolve_path(&self.resources.definitions_path)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve_path(&self.state.save_path)
    }

    /// Every setting with its value, hidden ones elided. This is exactly
    /// what `global get config` reports.
    pub fn settings(&self) -> Map<String, Value> {
        let mut settings = Map::new();
        let mut put = |key: &str, value: Value| {
            if !HIDDEN_SETTINGS.contains(&key) {
                settings.insert(key.to_string(), value);
            }
        };

        put("network.port", Value::from(self.network.port));
        put("network.listen", Value::from(self.network.listen.clone()));
        put("network.reuse_address", Value::from(self.network.reuse_address));
        put("network.send_keepalive", Value::from(self.network.send_keepalive));
        put("logging.logto", Value::from(self.logging.logto.clone()));
        put("input.listeners", Value::from(self.input.listeners.clone()));
        put("output.driver", Value::from(self.output.driver.clone()));
        put("channel.capacity", Value::from(self.channel.capacity as u64));
        put(
            "channel.output_channel",
            Value::from(self.channel.output_channel.clone()),
        );
        put(
            "channel.input_channel",
            Value::from(self.channel.input_channel.clone()),
        );
        put(
            "resources.definitions_path",
            Value::from(self.resources.definitions_path.display().to_string()),
        );
        put("state.enabled", Value::from(self.state.enabled));
        put("state.auto_restore", Value::from(self.state.auto_restore));
        put(
            "state.dump_on_shutdown",
            Value::from(self.state.dump_on_shutdown),
        );
        put("state.crash_recovery", Value::from(self.state.crash_recovery));
        put("state.format", Value::from(self.state.format.clone()));
        put(
            "state.save_path",
            Value::from(self.state.save_path.display().to_string()),
        );
        put(
            "state.max_dumps_per_game",
            Value::from(self.state.max_dumps_per_game),
        );
        put(
            "extensions.path",
            Value::from(self.extensions.path.display().to_string()),
        );

        settings
    }
}

fn env_value(key: &str) -> Option<String> {
    let variable = format!("YARND_{}", key.replace('.', "_").to_uppercase());
    std::env::var(variable).ok()
}

fn parse_bool(raw: &str, key: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "t" => Ok(true),
        "0" | "false" | "f" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_list(raw: &str, key: &str) -> Result<Vec<String>, ConfigError> {
    serde_json::from_str(raw).map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.network.port, 1040);
        assert_eq!(config.network.listen, vec!["127.0.0.1", "::1"]);
        assert_eq!(config.output.driver, "local");
        assert_eq!(config.state.format, "json");
        assert!(!config.state.enabled);
        assert_eq!(config.state.max_dumps_per_game, 0);
    }

    #[test]
    fn hidden_settings_never_show_up() {
        let settings = Config::default().settings();
        for hidden in HIDDEN_SETTINGS {
            assert!(!settings.contains_key(*hidden), "{hidden} leaked");
        }
        assert!(settings.contains_key("network.port"));
        assert!(settings.contains_key("state.enabled"));
    }

    #[test]
    fn relative_paths_resolve_against_the_prefix() {
        let mut config = Config::default();
        config.install_prefix = PathBuf::from("/opt/yarnd");

        assert_eq!(
            config.resolve_path(Path::new("share/yarnd")),
            PathBuf::from("/opt/yarnd/share/yarnd")
        );
        assert_eq!(
            config.resolve_path(Path::new("/var/state")),
            PathBuf::from("/var/state")
        );
    }

    #[test]
    fn boolean_overrides_accept_the_short_forms() {
        assert!(parse_bool("t", "x").unwrap());
        assert!(parse_bool("1", "x").unwrap());
        assert!(!parse_bool("F", "x").unwrap());
        assert!(parse_bool("yes", "x").is_err());
    }
}
