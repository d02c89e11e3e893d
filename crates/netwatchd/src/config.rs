//! Daemon configuration.
//!
//! Settings come from an optional TOML file. Every key has a default,
//! so an empty file (or no file at all) is a valid configuration.
//! The binary applies command-line overrides on top.
//!
//! ```toml
//! host = "1.1.1.1"
//! probe = "tcp"
//! tcp_port = 443
//! poll_interval_ms = 500
//! probe_timeout_ms = 1000
//! heartbeat_interval_secs = 300
//! history_on_init = false
//! delivery = "single"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::DeliveryMode;
use crate::server::DEFAULT_SOCKET_PATH;

/// Default probed host.
pub const DEFAULT_HOST: &str = "8.8.8.8";

/// Default sampling cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default per-attempt probe bound.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

/// Default maximum silence on a subscriber connection.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 300;

/// Default port for the TCP probe.
pub const DEFAULT_TCP_PORT: u16 = 53;

/// Default cap on concurrent subscriber sessions.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 64;

/// Which probe backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// One ICMP echo request via the system `ping`
    #[default]
    Icmp,

    /// One TCP connect to `host:tcp_port`
    Tcp,
}

/// Full daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Monitored host
    pub host: String,

    /// Probe backend
    pub probe: ProbeKind,

    /// Port used by the TCP probe
    pub tcp_port: u16,

    /// Sampling cadence in milliseconds
    pub poll_interval_ms: u64,

    /// Per-attempt probe bound in milliseconds
    pub probe_timeout_ms: u64,

    /// Maximum silence on a subscriber connection, in seconds
    pub heartbeat_interval_secs: u64,

    /// Transition log file
    pub database_path: PathBuf,

    /// Unix socket for the status push channel
    pub socket_path: PathBuf,

    /// Answer `init` requests with the full history
    pub history_on_init: bool,

    /// How many waiting sessions receive each notification
    pub delivery: DeliveryMode,

    /// Maximum concurrent subscriber sessions
    pub max_subscribers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            probe: ProbeKind::default(),
            tcp_port: DEFAULT_TCP_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            database_path: default_database_path(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            history_on_init: false,
            delivery: DeliveryMode::default(),
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: "must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.max_subscribers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_subscribers",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Sampling cadence.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-attempt probe bound.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Maximum silence on a subscriber connection.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Returns `$XDG_STATE_HOME/netwatch/uptime.redb` (or `/tmp/netwatch/...`).
pub fn default_database_path() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("netwatch")
        .join("uptime.redb")
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
