//! TOML-based configuration for the host.
//!
//! Reads and writes [`HostConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\MeshProxy\config.toml`
//! - Linux:    `~/.config/meshproxy/config.toml` (honours `XDG_CONFIG_HOME`)
//! - macOS:    `~/Library/Application Support/MeshProxy/config.toml`
//!
//! Every field has a default, so a missing file (first run) or a file from an
//! older version with fewer keys loads cleanly:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [polling]
//! stats_interval_ms = 1000
//! ```
//!
//! The stats interval is the one value the console changes at runtime; it is
//! clamped to [`MIN_STATS_INTERVAL_MS`]..=[`MAX_STATS_INTERVAL_MS`] whenever it
//! is read or set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::handshake::HandshakeConfig;
use crate::application::link_session::SessionConfig;

pub const MIN_STATS_INTERVAL_MS: u64 = 10;
pub const MAX_STATS_INTERVAL_MS: u64 = 10_000;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub handshake: HandshakeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Connect as soon as the console starts.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout of the reader thread; bounds how long a close waits.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Target period between background `GetInfo` requests.
    #[serde(default = "default_info_cadence_ms")]
    pub info_cadence_ms: u64,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Delay before the `GetInfo` that confirms a save.
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakeSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_port() -> String {
    #[cfg(target_os = "windows")]
    {
        "COM3".to_string()
    }
    #[cfg(target_os = "macos")]
    {
        "/dev/cu.usbmodem1101".to_string()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "/dev/ttyACM0".to_string()
    }
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_info_cadence_ms() -> u64 {
    5000
}

fn default_status_interval_ms() -> u64 {
    100
}

fn default_confirm_delay_ms() -> u64 {
    200
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_timeout_ms() -> u64 {
    1500
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_settle_delay_ms() -> u64 {
    150
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            auto_connect: default_true(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            stats_interval_ms: default_stats_interval_ms(),
            info_cadence_ms: default_info_cadence_ms(),
            status_interval_ms: default_status_interval_ms(),
            confirm_delay_ms: default_confirm_delay_ms(),
        }
    }
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_ms: default_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

// ── Mapping onto the session ──────────────────────────────────────────────────

/// Clamps a stats polling interval to the supported range.
pub fn clamp_stats_interval_ms(ms: u64) -> u64 {
    ms.clamp(MIN_STATS_INTERVAL_MS, MAX_STATS_INTERVAL_MS)
}

impl HostConfig {
    /// Sets the stats interval, clamped, and returns the stored value.
    pub fn set_stats_interval_ms(&mut self, ms: u64) -> u64 {
        self.polling.stats_interval_ms = clamp_stats_interval_ms(ms);
        self.polling.stats_interval_ms
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms.max(1))
    }

    /// Builds the session's timing configuration.
    pub fn session_config(&self) -> SessionConfig {
        let p = &self.polling;
        let h = &self.handshake;
        SessionConfig {
            stats_interval: Duration::from_millis(clamp_stats_interval_ms(p.stats_interval_ms)),
            info_cadence: Duration::from_millis(p.info_cadence_ms),
            status_interval: Duration::from_millis(p.status_interval_ms.max(1)),
            confirm_delay: Duration::from_millis(p.confirm_delay_ms),
            handshake: HandshakeConfig {
                max_attempts: h.max_attempts.max(1),
                attempt_timeout: Duration::from_millis(h.attempt_timeout_ms),
                poll_interval: Duration::from_millis(h.poll_interval_ms.max(1)),
                backoff: Duration::from_millis(h.backoff_ms),
                settle_delay: Duration::from_millis(h.settle_delay_ms),
            },
            ..SessionConfig::default()
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path, or defaults if there is no file.
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `HostConfig` from `path`, returning `HostConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let mut cfg: HostConfig = toml::from_str(&content)?;
            cfg.polling.stats_interval_ms = clamp_stats_interval_ms(cfg.polling.stats_interval_ms);
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform path.
pub fn save_config(config: &HostConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &HostConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory plus the `MeshProxy` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MeshProxy"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MeshProxy")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("meshproxy"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
