//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Connection settings for the prediction / history backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the backend, without a trailing slash
    /// (e.g. `http://192.168.1.20:8000`).
    pub base_url: String,
    /// Timeout applied to every request (history, delete, audio download).
    pub timeout_secs: u64,
    /// Timeout applied to the two prediction uploads, which carry audio and
    /// wait on model inference.
    pub upload_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            timeout_secs: 10,
            upload_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// RecorderConfig
// ---------------------------------------------------------------------------

/// Settings for the real-time record → analyze cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Rate the captured audio is converted to and the rate written into the
    /// WAV header.  The backend's real-time decoder assumes 48 kHz.
    pub sample_rate: u32,
    /// No analysis happens before the session has been recording this long.
    pub min_recording_ms: u64,
    /// Period of the analysis timer.
    pub analysis_interval_ms: u64,
    /// Period of the elapsed-time counter.
    pub tick_interval_ms: u64,
    /// Period of the amplitude poll.
    pub level_poll_ms: u64,
    /// dBFS value that maps to a display level of `0.0`.
    pub level_floor_db: f32,
    /// End the session after the first analysis instead of rolling over to
    /// a fresh capture file.
    pub auto_stop_after_analysis: bool,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            min_recording_ms: 2_000,
            analysis_interval_ms: 3_000,
            tick_interval_ms: 1_000,
            level_poll_ms: 100,
            level_floor_db: -60.0,
            auto_stop_after_analysis: true,
            input_device: None,
        }
    }
}

impl RecorderConfig {
    pub fn min_recording(&self) -> Duration {
        Duration::from_millis(self.min_recording_ms)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn level_poll_interval(&self) -> Duration {
        Duration::from_millis(self.level_poll_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of records requested from `/api/history`.
    pub limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use mewsage::config::{AppConfig, AppPaths};
///
/// let paths = AppPaths::new();
/// // Returns Default when the file is missing
/// let mut config = AppConfig::load_from(&paths.settings_file).unwrap();
///
/// config.history.limit = 25;
/// config.save_to(&paths.settings_file).unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend connection settings.
    pub server: ServerConfig,
    /// Recording / analysis cycle settings.
    pub recorder: RecorderConfig,
    /// History listing settings.
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Load configuration from `path`, usually
    /// [`AppPaths::settings_file`](super::AppPaths::settings_file).
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
