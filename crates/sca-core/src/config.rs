//! Configuration resolution for the sync engine.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sca-sync/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Polling and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between poll cycles (seconds).
    pub poll_interval_secs: u64,
    /// Retention window for terminal or expired records (seconds).
    pub final_ttl_secs: u64,
    /// Interval of the daemon's expiry timer (seconds).
    pub expiry_check_interval_secs: u64,
    /// Capacity of the observer event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            final_ttl_secs: 4,
            expiry_check_interval_secs: 1,
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn final_ttl(&self) -> Duration {
        Duration::from_secs(self.final_ttl_secs)
    }

    pub const fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval_secs)
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpConfig {
    /// Value sent in the `Accept-Language` header.
    pub app_language: String,
    /// Per-request timeout (seconds). Zero leaves the transport default.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            app_language: "en".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".sca-sync").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/sca-sync/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("sca-sync").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("SCA_POLL_INTERVAL_SECS")
        && let Ok(n) = val.parse()
    {
        config.sync.poll_interval_secs = n;
    }
    if let Ok(val) = std::env::var("SCA_FINAL_TTL_SECS")
        && let Ok(n) = val.parse()
    {
        config.sync.final_ttl_secs = n;
    }
    if let Ok(val) = std::env::var("SCA_APP_LANGUAGE") {
        config.http.app_language = val;
    }
    if let Ok(val) = std::env::var("SCA_LOG_LEVEL") {
        config.logging.level = val;
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.poll_interval_secs == 0 {
        return Err(Error::Config("sync.poll_interval_secs must be > 0".into()));
    }
    if config.sync.expiry_check_interval_secs == 0 {
        return Err(Error::Config("sync.expiry_check_interval_secs must be > 0".into()));
    }
    if config.sync.event_capacity == 0 {
        return Err(Error::Config("sync.event_capacity must be > 0".into()));
    }
    Ok(())
}
