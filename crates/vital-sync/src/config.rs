//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VITAL_SERVER_URL=https://api.vital.example                         │
//! │     VITAL_DEVICE_ID=abc-123                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vital/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.vital.app/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device_id, localhost server                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Pixel 8"
//!
//! [server]
//! base_url = "https://api.vital.example"
//! request_timeout_secs = 30
//!
//! [sync]
//! batch_size = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run; the refresh token is bound to it.
    pub id: String,

    /// Human-readable device name (e.g., "Pixel 8", "iPhone 15").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Vital Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Remote API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the remote API (e.g., "https://api.vital.example").
    pub base_url: String,

    /// Per-request timeout (seconds). A timeout is treated identically to
    /// any other network failure.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Maximum entries picked up per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Page size for remote listing calls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pause before the auto-sync watcher re-triggers after a pass with
    /// failures. Prevents a failing backend from being hammered.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_batch_size() -> u32 {
    100
}

fn default_page_size() -> u32 {
    50
}

fn default_retry_delay() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

// =============================================================================
// Sync Config (top level)
// =============================================================================

/// Top-level sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Loads configuration from the given path, falling back to defaults.
    ///
    /// ## Resolution Order
    /// 1. Explicit `path` argument
    /// 2. Platform config directory (`directories` crate)
    /// 3. Built-in defaults (auto-generated device id)
    ///
    /// Environment variables `VITAL_SERVER_URL` and `VITAL_DEVICE_ID`
    /// override whatever was loaded.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let path = path.or_else(Self::default_path);

        let mut config = match path {
            Some(ref p) if p.exists() => match Self::load(p) {
                Ok(c) => {
                    info!(path = %p.display(), "Loaded sync configuration");
                    c
                }
                Err(e) => {
                    warn!(?e, path = %p.display(), "Failed to load config, using defaults");
                    SyncConfig::default()
                }
            },
            _ => {
                debug!("No config file found, using defaults");
                SyncConfig::default()
            }
        };

        config.apply_env_overrides();
        config
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &PathBuf) -> SyncResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &PathBuf) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        debug!(path = %path.display(), "Saved sync configuration");
        Ok(())
    }

    /// Platform-default config file path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vital", "vital")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VITAL_SERVER_URL") {
            if !url.is_empty() {
                self.server.base_url = url;
            }
        }
        if let Ok(id) = std::env::var("VITAL_DEVICE_ID") {
            if !id.is_empty() {
                self.device.id = id;
            }
        }
    }

    /// Validates the configuration before the engine starts.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device id is empty".into()));
        }

        let url = reqwest::Url::parse(&self.server.base_url)
            .map_err(|e| SyncError::InvalidConfig(format!("invalid server URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidConfig(format!(
                "server URL must be http(s), got '{}'",
                url.scheme()
            )));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch_size must be > 0".into()));
        }

        Ok(())
    }

    /// The device id for this installation.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}

// =============================================================================
// Tests
// =============================================================================
