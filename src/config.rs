//! Application configuration
//!
//! All settings have working defaults; a TOML file can override any
//! subset. The host binary looks for `config.toml` in the platform
//! config directory unless an explicit path is given.

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::Path;

use crate::audio::SampleFormat;
use crate::constants::*;
use crate::error::{Error, Result};
use std::time::Duration;

/// Capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Sample encoding requested from the device
    pub format: SampleFormat,

    /// Samples pulled per read
    pub block_size: usize,

    /// Input device name; `None` selects the platform default microphone
    pub device: Option<String>,

    /// Chunk queue capacity between the capture callback and the reader
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            format: SampleFormat::I16,
            block_size: DEFAULT_BLOCK_SIZE,
            device: None,
            queue_capacity: CHUNK_QUEUE_CAPACITY,
        }
    }
}

/// Supervisor loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pause between reads in milliseconds
    pub read_interval_ms: u64,

    /// Backoff before reopening a stalled device, in milliseconds
    ///
    /// A recovery heuristic inherited from field observation rather than
    /// a proven-optimal constant; tune it here, not in the loop.
    pub recovery_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
            recovery_backoff_ms: DEFAULT_RECOVERY_BACKOFF_MS,
        }
    }
}

impl EngineConfig {
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }
}

/// Presentation settings consumed by the zone classifier and host UI
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Loudness limit in dB; readings above it are flagged over-limit
    pub limit_db: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            limit_db: DEFAULT_LIMIT_DB,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    pub display: DisplayConfig,
}

impl MeterConfig {
    /// Load configuration from an explicit path, the platform config
    /// directory, or defaults, in that order
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Some(dirs) = ProjectDirs::from("", "", "noise-meter") {
            let default_path = dirs.config_dir().join("config.toml");
            if default_path.exists() {
                return Self::from_file(&default_path);
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
