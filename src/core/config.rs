//! Client configuration
//!
//! Loads [`ClientConfig`] from a JSON file. Provides the server addresses,
//! timing constants and default game setup used by every mode.
//!
//! # File Location
//!
//! Without an explicit `--config` path the client looks for `config.json` in
//! the user's configuration directory, e.g.
//! `~/.config/chess-sync/config.json` on Linux.
//!
//! # Error Handling
//!
//! - A missing file means defaults
//! - A file that cannot be read or parsed is logged and defaults are used
//!
//! Durations are written as human strings (`"1s"`, `"1500ms"`).

use crate::core::error::{CoreError, CoreResult};
use crate::networking::api::ColorChoice;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config filename
const CONFIG_FILENAME: &str = "config.json";

/// Everything the client needs to know before it talks to a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the HTTP API
    pub http_base_url: String,
    /// Base URL prepended to socket paths returned by the API
    pub socket_base_url: String,
    /// Interval between liveness pings on an open connection
    #[serde(with = "human_duration")]
    pub heartbeat_interval: Duration,
    /// Opponent "thinking" delay before a puzzle reply is played
    #[serde(with = "human_duration")]
    pub puzzle_reply_delay: Duration,
    /// Delay before a wrong puzzle move is taken back
    #[serde(with = "human_duration")]
    pub puzzle_undo_delay: Duration,
    /// Scheme used by invitation deep links
    pub deep_link_scheme: String,
    /// Defaults for newly created games
    pub setup: SetupDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_base_url: "https://en.lichess.org".to_owned(),
            socket_base_url: "wss://socket.lichess.org".to_owned(),
            heartbeat_interval: Duration::from_secs(1),
            puzzle_reply_delay: Duration::from_secs(1),
            puzzle_undo_delay: Duration::from_secs(1),
            deep_link_scheme: "lichess599".to_owned(),
            setup: SetupDefaults::default(),
        }
    }
}

/// Default values offered when creating a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupDefaults {
    /// Minutes per side for real-time games
    pub minutes: u32,
    /// Increment in seconds
    pub increment_seconds: u32,
    /// Computer opponent strength (1-8)
    pub ai_level: u8,
    pub color: ColorChoice,
}

impl Default for SetupDefaults {
    fn default() -> Self {
        Self {
            minutes: 5,
            increment_seconds: 8,
            ai_level: 3,
            color: ColorChoice::White,
        }
    }
}

impl ClientConfig {
    /// Reject values the client cannot run with
    pub fn validate(&self) -> CoreResult<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(CoreError::InvalidValue {
                field: "heartbeat_interval",
                message: "must be greater than zero".to_owned(),
            });
        }
        if !(1..=8).contains(&self.setup.ai_level) {
            return Err(CoreError::InvalidValue {
                field: "setup.ai_level",
                message: format!("{} is outside 1..=8", self.setup.ai_level),
            });
        }
        Ok(())
    }
}

/// Resolve the default config file path
///
/// Falls back to a local `config.json` if the system config dir cannot be found.
pub fn default_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("org", "chess-sync", "chess-sync") {
        proj_dirs.config_dir().join(CONFIG_FILENAME)
    } else {
        PathBuf::from(CONFIG_FILENAME)
    }
}

/// Read and validate a config file
pub fn read_config(path: &Path) -> CoreResult<ClientConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Load the config, falling back to defaults on any failure
pub fn load_config(explicit: Option<&Path>) -> ClientConfig {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    if !path.exists() {
        info!("[CONFIG] No config file found at {:?}. Using defaults.", path);
        return ClientConfig::default();
    }

    match read_config(&path) {
        Ok(config) => {
            info!("[CONFIG] Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            warn!(
                "[CONFIG] Failed to load config at {:?}: {}. Using defaults.",
                path, e
            );
            ClientConfig::default()
        }
    }
}

/// Write a config file, creating its directory if needed
pub fn write_config(path: &Path, config: &ClientConfig) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    info!("[CONFIG] Saved config to {:?}", path);
    Ok(())
}

mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
