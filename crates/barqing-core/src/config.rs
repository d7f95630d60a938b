//! barqing configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BarqingError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BarqingConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub barq: BarqConfig,
    #[serde(default)]
    pub refresher: RefresherConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl BarqingConfig {
    /// Load config from the default path (~/.barqing/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BarqingError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BarqingError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the barqing home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".barqing")
    }

    /// Fail early on settings that cannot work at all.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(BarqingError::Config("telegram bot token is not set".into()));
        }
        if self.refresher.poll_interval_secs == 0 {
            return Err(BarqingError::Config("refresher.poll_interval_secs must be > 0".into()));
        }
        if self.store.flush_interval_secs == 0 {
            return Err(BarqingError::Config("store.flush_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Long-poll timeout handed to `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Pause after a failed `getUpdates` before polling again.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

fn default_poll_timeout() -> u64 { 30 }
fn default_error_backoff() -> u64 { 5 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout_secs: default_poll_timeout(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

/// Remote chat API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarqConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String { "https://api.barq.app/graphql".into() }
fn default_request_timeout() -> u64 { 30 }

impl Default for BarqConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Per-user polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefresherConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// When set, consecutive API failures double the wait up to this ceiling.
    /// Unset keeps the fixed interval forever.
    #[serde(default)]
    pub backoff_ceiling_secs: Option<u64>,
}

fn default_poll_interval() -> u64 { 5 }

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            backoff_ceiling_secs: None,
        }
    }
}

impl RefresherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff_ceiling(&self) -> Option<Duration> {
        self.backoff_ceiling_secs.map(Duration::from_secs)
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

fn default_store_path() -> String { "~/.barqing/barqing.db".into() }
fn default_flush_interval() -> u64 { 600 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

impl StoreConfig {
    /// Store path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}
