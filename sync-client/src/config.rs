//! Session configuration for Convo Sync.
//!
//! All timing constants of the engines live here. Configuration can be
//! built in code or loaded from a TOML file:
//!
//! ```toml
//! [messages]
//! retry_delay_ms = 3000
//!
//! [typing]
//! idle_ms = 2000
//! remote_ttl_ms = 5000
//!
//! [presence]
//! heartbeat_interval_secs = 30
//! activity_window_secs = 60
//!
//! [connection]
//! reconnect_delay_ms = 3000
//! ```
//!
//! Missing sections and fields take their defaults.

use convo_sync_core::{DEFAULT_ACTIVITY_WINDOW, RECONNECT_DELAY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Message sending configuration.
    #[serde(default)]
    pub messages: MessagesConfig,
    /// Typing indicator configuration.
    #[serde(default)]
    pub typing: TypingConfig,
    /// Presence configuration.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Transport connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Message sending configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessagesConfig {
    /// Delay before the automatic retry of a failed send (default: 3000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Typing indicator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingConfig {
    /// Inactivity before `typing=false` is broadcast (default: 2000).
    #[serde(default = "default_typing_idle_ms")]
    pub idle_ms: u64,
    /// Lifetime of a remote typing entry without refresh (default: 5000).
    #[serde(default = "default_remote_typing_ttl_ms")]
    pub remote_ttl_ms: u64,
}

/// Presence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresenceConfig {
    /// Heartbeat period in seconds (default: 30).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Input recency that still counts as active, in seconds (default: 60).
    #[serde(default = "default_activity_window_secs")]
    pub activity_window_secs: u64,
}

/// Transport connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Fixed delay before a reconnect attempt (default: 3000).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

// Default value functions
fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_typing_idle_ms() -> u64 {
    2000
}

fn default_remote_typing_ttl_ms() -> u64 {
    5000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_activity_window_secs() -> u64 {
    DEFAULT_ACTIVITY_WINDOW.as_secs()
}

fn default_reconnect_delay_ms() -> u64 {
    RECONNECT_DELAY.as_millis() as u64
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            idle_ms: default_typing_idle_ms(),
            remote_ttl_ms: default_remote_typing_ttl_ms(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            activity_window_secs: default_activity_window_secs(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Set the automatic retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.messages.retry_delay_ms = millis(delay);
        self
    }

    /// Set the typing inactivity timeout.
    pub fn with_typing_idle(mut self, idle: Duration) -> Self {
        self.typing.idle_ms = millis(idle);
        self
    }

    /// Set the remote typing entry lifetime.
    pub fn with_remote_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing.remote_ttl_ms = millis(ttl);
        self
    }

    /// Set the heartbeat period (whole seconds).
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.presence.heartbeat_interval_secs = interval.as_secs();
        self
    }

    /// Set the activity window (whole seconds).
    pub fn with_activity_window(mut self, window: Duration) -> Self {
        self.presence.activity_window_secs = window.as_secs();
        self
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.connection.reconnect_delay_ms = millis(delay);
        self
    }

    /// Automatic retry delay.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.messages.retry_delay_ms)
    }

    /// Typing inactivity timeout.
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing.idle_ms)
    }

    /// Remote typing entry lifetime.
    pub fn remote_typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing.remote_ttl_ms)
    }

    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.presence.heartbeat_interval_secs)
    }

    /// Activity window.
    pub fn activity_window(&self) -> Duration {
        Duration::from_secs(self.presence.activity_window_secs)
    }

    /// Reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.connection.reconnect_delay_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
