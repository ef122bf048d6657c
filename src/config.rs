//! TOML configuration.
//!
//! Lives at `config.toml` under the platform config directory
//! (`~/.config/jukebox` on Linux, `%APPDATA%\jukebox` on Windows,
//! `~/Library/Application Support/jukebox` on macOS). Every field has a
//! default, so a partial file or no file at all is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything the binary reads from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter, e.g. "jukebox=debug" (RUST_LOG wins when set)
    pub log_filter: Option<String>,

    /// Session behaviour
    pub playback: PlaybackConfig,

    /// Simulated output used by the CLI
    pub simulator: SimulatorConfig,

    /// Track catalog used by the CLI resolver
    pub catalog: CatalogConfig,
}

/// Session behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How long `skip_to` waits for each advance before giving up
    pub advance_timeout_ms: u64,

    /// Capacity of each session's event channel
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            advance_timeout_ms: 5000,
            event_capacity: 64,
        }
    }
}

impl PlaybackConfig {
    pub fn advance_timeout(&self) -> Duration {
        Duration::from_millis(self.advance_timeout_ms)
    }
}

/// Simulated output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Track length used when a resource doesn't know its own
    pub default_track_secs: u64,

    /// Playback speed-up factor (2.0 plays a 3 minute track in 90s)
    pub time_scale: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_track_secs: 180,
            time_scale: 1.0,
        }
    }
}

impl SimulatorConfig {
    /// Wall-clock time needed to play `length` of audio.
    pub fn scaled(&self, length: Duration) -> Duration {
        if self.time_scale.is_finite() && self.time_scale > 0.0 {
            length.div_f64(self.time_scale)
        } else {
            length
        }
    }

    pub fn default_track_len(&self) -> Duration {
        Duration::from_secs(self.default_track_secs)
    }
}

/// Catalog settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog file path
    pub path: Option<PathBuf>,
}

// ============================================================================
// Loading and saving
// ============================================================================

/// `<platform config dir>/jukebox`
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("jukebox"))
}

/// `<platform config dir>/jukebox/config.toml`
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load from the platform location.
///
/// A missing file or config directory yields defaults; a file that exists
/// but can't be read or parsed is an error, so the caller decides how to
/// report it.
pub fn load() -> Result<Config, ConfigError> {
    match config_path() {
        Some(path) => load_from(&path),
        None => Ok(Config::default()),
    }
}

/// Load from `path`, or defaults if there is no file there.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// Save to the platform location and return where it went.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save to `path`, creating parent directories. The file is replaced
/// atomically via a sibling temp file.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }

    let text = toml::to_string_pretty(config)?;
    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, text).map_err(io_error(&staging))?;
    std::fs::rename(&staging, path).map_err(io_error(path))?;

    tracing::info!(path = %path.display(), "Config saved");
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + use<> {
    let path = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config directory on this platform")]
    NoConfigDir,

    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl From<ConfigError> for crate::error::Error {
    fn from(err: ConfigError) -> Self {
        crate::error::Error::config(err.to_string())
    }
}
