//! Session configuration.
//!
//! One explicitly constructed object handed to the session and the engine at
//! creation; nothing here is process-global. Stored as JSON, every field
//! optional.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::PgnExporter;

const CONFIG_FILENAME: &str = "config.json";
const SAVE_FILENAME: &str = "saved_game.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Side the human plays when a fresh game starts
    pub player_is_white: bool,
    /// Where the game in progress is saved; defaults to the user data dir
    pub save_path: Option<PathBuf>,
    /// Restore the saved game on the first reset of the process
    pub restore_saved_game: bool,
    /// How long a reset waits for a cancelled search to stop
    pub stop_timeout_ms: u64,
    pub pgn: PgnConfig,
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player_is_white: true,
            save_path: None,
            restore_saved_game: true,
            stop_timeout_ms: 2_000,
            pgn: PgnConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// PGN header values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgnConfig {
    pub event: String,
    pub site: String,
    pub player_name: String,
    pub engine_name: String,
}

impl Default for PgnConfig {
    fn default() -> Self {
        let exporter = PgnExporter::default();
        Self {
            event: exporter.event,
            site: exporter.site,
            player_name: exporter.player_name,
            engine_name: exporter.engine_name,
        }
    }
}

/// Search engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// UCI engine executable; without one a random mover is used
    pub path: Option<PathBuf>,
    /// Thinking time per engine move
    pub move_time_ms: u64,
    /// Forwarded to the engine as `setoption` commands
    pub options: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            move_time_ms: 500,
            options: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Default config file location, e.g. `~/.config/chess-session/config.json`
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME))
    }

    /// Load from `path`; a missing or invalid file yields the defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("[CONFIG] No config file at {:?}. Using defaults.", path);
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SessionConfig>(&contents) {
                Ok(config) => {
                    info!("[CONFIG] Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("[CONFIG] Failed to parse {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("[CONFIG] Failed to read {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    /// The save file to use, resolving the default location
    pub fn resolved_save_path(&self) -> PathBuf {
        self.save_path.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|dirs| dirs.data_dir().join(SAVE_FILENAME))
                .unwrap_or_else(|| PathBuf::from(SAVE_FILENAME))
        })
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn move_time(&self) -> Duration {
        Duration::from_millis(self.engine.move_time_ms)
    }

    pub fn pgn_exporter(&self) -> PgnExporter {
        PgnExporter {
            event: self.pgn.event.clone(),
            site: self.pgn.site.clone(),
            player_name: self.pgn.player_name.clone(),
            engine_name: self.pgn.engine_name.clone(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "chess-session", "chess-session")
}
