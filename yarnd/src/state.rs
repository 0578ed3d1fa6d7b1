//! On-disk game state.
//!
//! Layout under the state path:
//!
//! ```text
//! <state>/<game-id>/
//!   meta          -- key = value: id, name, definition, created
//!   <slot>/
//!     timestamp   -- decimal seconds since the epoch
//!     format      -- serialization format name
//!     game        -- the serialized world
//! ```
//!
//! Slots are numbered from 0; the highest number is the current dump. The
//! meta file is written to a temp name first and renamed into place, so a
//! crash mid-dump never corrupts it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tale_engine::Snapshot;

use crate::error::{Error, Result};

pub const META_FILE: &str = "meta";
pub const TIMESTAMP_FILE: &str = "timestamp";
pub const FORMAT_FILE: &str = "format";
pub const GAME_FILE: &str = "game";

/// A named world serialization codec.
pub trait SerialFormat: Send + Sync {
    fn name(&self) -> &str;
    fn serialize(&self, snapshot: &Snapshot) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Snapshot>;
}

/// Human-readable dumps.
pub struct JsonFormat;

impl SerialFormat for JsonFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(snapshot)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Snapshot> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary dumps.
pub struct PostcardFormat;

impl SerialFormat for PostcardFormat {
    fn name(&self) -> &str {
        "postcard"
    }

    fn serialize(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        postcard::to_stdvec(snapshot).map_err(|e| Error::Internal(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Snapshot> {
        postcard::from_bytes(bytes).map_err(|e| Error::Internal(e.to_string()))
    }
}

/// The format registry. Like the driver registry, names map to singletons.
pub struct Formats {
    formats: HashMap<String, Arc<dyn SerialFormat>>,
}

impl Formats {
    pub fn new() -> Formats {
        let mut formats: HashMap<String, Arc<dyn SerialFormat>> = HashMap::new();
        for format in [
            Arc::new(JsonFormat) as Arc<dyn SerialFormat>,
            Arc::new(PostcardFormat),
        ] {
            formats.insert(format.name().to_string(), format);
        }
        Formats { formats }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SerialFormat>> {
        self.formats
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("'{name}' is not a valid serialization format")))
    }
}

/// The identity block written next to a game's slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpMeta {
    pub id: u64,
    pub name: String,
    pub definition: String,
    pub created: u64,
}

pub fn game_dir(state_path: &Path, id: u64) -> PathBuf {
    state_path.join(id.to_string())
}

pub fn slot_dir(state_path: &Path, id: u64, slot: u64) -> PathBuf {
    game_dir(state_path, id).join(slot.to_string())
}

/// All slot numbers a dumped game has, in ascending order.
pub fn slot_numbers(game_dir: &Path) -> BTreeSet<u64> {
    let Ok(entries) = std::fs::read_dir(game_dir) else {
        return BTreeSet::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().and_then(|n| n.parse().ok()))
        .collect()
}

/// All game ids that have a dump directory.
pub fn dumped_game_ids(state_path: &Path) -> Vec<u64> {
    let Ok(entries) = std::fs::read_dir(state_path) else {
        return Vec::new();
    };

    let mut ids: Vec<u64> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().and_then(|n| n.parse().ok()))
        .collect();
    ids.sort_unstable();
    ids
}

/// Writes the meta file atomically (temp file, then rename.)
pub fn write_meta(game_dir: &Path, meta: &DumpMeta) -> Result<()> {
    std::fs::create_dir_all(game_dir)?;

    let rendered = toml::to_string(meta).map_err(|e| Error::Internal(e.to_string()))?;
    let temp = game_dir.join(format!("{META_FILE}.tmp"));
    std::fs::write(&temp, rendered)?;
    std::fs::rename(&temp, game_dir.join(META_FILE))?;
    Ok(())
}

pub fn read_meta(game_dir: &Path) -> Result<DumpMeta> {
    let raw = std::fs::read_to_string(game_dir.join(META_FILE))?;
    toml::from_str(&raw).map_err(|e| Error::Internal(e.to_string()))
}

/// Writes one dump slot.
pub fn write_slot(
    game_dir: &Path,
    slot: u64,
    format: &str,
    payload: &[u8],
    timestamp: u64,
) -> Result<()> {
    let slot_dir = game_dir.join(slot.to_string());
    std::fs::create_dir_all(&slot_dir)?;
    std::fs::write(slot_dir.join(TIMESTAMP_FILE), timestamp.to_string())?;
    std::fs::write(slot_dir.join(FORMAT_FILE), format)?;
    std::fs::write(slot_dir.join(GAME_FILE), payload)?;
    Ok(())
}

/// Reads one dump slot back as `(timestamp, format, payload)`.
pub fn read_slot(game_dir: &Path, slot: u64) -> Result<(u64, String, Vec<u8>)> {
    let slot_dir = game_dir.join(slot.to_string());
    let timestamp = slot_timestamp(&slot_dir)?;
    let format = std::fs::read_to_string(slot_dir.join(FORMAT_FILE))?;
    let payload = std::fs::read(slot_dir.join(GAME_FILE))?;
    Ok((timestamp, format.trim().to_string(), payload))
}

pub fn slot_timestamp(slot_dir: &Path) -> Result<u64> {
    let raw = std::fs::read_to_string(slot_dir.join(TIMESTAMP_FILE))?;
    raw.trim()
        .parse()
        .map_err(|_| Error::Internal(format!("corrupt timestamp in {}", slot_dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tale_engine::{Definition, Game, IoBindings};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "yarnd-state-test-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn snapshot() -> Snapshot {
        let definition: Definition = serde_json::from_value(serde_json::json!({
            "title": "test",
            "rooms": [{"name": "start", "description": "Start."}]
        }))
        .unwrap();
        Game::new(&definition, IoBindings::disconnected())
            .unwrap()
            .snapshot()
    }

    #[test]
    fn meta_survives_the_disk() {
        let dir = temp_dir("meta");
        let meta = DumpMeta {
            id: 4,
            name: "myGame".into(),
            definition: "game.json".into(),
            created: 1700000000,
        };

        write_meta(&dir, &meta).unwrap();
        let read = read_meta(&dir).unwrap();
        assert_eq!(read.id, 4);
        assert_eq!(read.name, "myGame");
        assert_eq!(read.definition, "game.json");
        assert_eq!(read.created, 1700000000);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn both_formats_round_trip_a_snapshot() {
        let formats = Formats::new();
        let snapshot = snapshot();

        for name in ["json", "postcard"] {
            let format = formats.get(name).unwrap();
            let bytes = format.serialize(&snapshot).unwrap();
            let restored = format.deserialize(&bytes).unwrap();
            let game = Game::from_snapshot(restored, IoBindings::disconnected());
            assert_eq!(game.entity("start").unwrap().name, "start");
        }

        assert!(formats.get("yaml").is_err());
    }

    #[test]
    fn slot_numbers_skip_foreign_directories() {
        let dir = temp_dir("slots");
        write_slot(&dir, 0, "json", b"{}", 10).unwrap();
        write_slot(&dir, 3, "json", b"{}", 11).unwrap();
        std::fs::create_dir_all(dir.join("not-a-slot")).unwrap();

        assert_eq!(slot_numbers(&dir), BTreeSet::from([0, 3]));

        let (timestamp, format, payload) = read_slot(&dir, 3).unwrap();
        assert_eq!(timestamp, 11);
        assert_eq!(format, "json");
        assert_eq!(payload, b"{}");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
