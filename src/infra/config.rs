// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::paths;
use crate::retry::Backoff;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

/// HTTP API the session manager persists to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Upper bound for the detached page-unload notification.
    pub beacon_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            request_timeout_secs: 10,
            beacon_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_save_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub history_cache_secs: u64,
    /// Maximum number of past sessions shown in the history panel.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_save_attempts: 3,
            retry_base_delay_ms: 1_000,
            history_cache_secs: 30,
            history_limit: 20,
        }
    }
}

impl SessionConfig {
    /// Saves back off linearly: `attempt × base`.
    pub fn save_backoff(&self) -> Backoff {
        Backoff::linear(Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.history_cache_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base WebSocket URL; the user id is appended as the last path segment.
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub keepalive_interval_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".into(),
            max_reconnect_attempts: 5,
            initial_reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            keepalive_interval_secs: 30,
        }
    }
}

impl TransportConfig {
    /// Reconnects back off exponentially with a ceiling.
    pub fn reconnect_backoff(&self) -> Backoff {
        Backoff::exponential(
            Duration::from_millis(self.initial_reconnect_delay_ms),
            Duration::from_millis(self.max_reconnect_delay_ms),
        )
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
