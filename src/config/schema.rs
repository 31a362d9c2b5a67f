//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Root configuration for the sync agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Cluster name shared by every application.
    pub cluster: String,

    /// Synchronization mode (polling or long-polling).
    #[serde(alias = "type")]
    pub mode: SyncMode,

    /// Remote config service base URL (e.g., "http://apollo:8080").
    pub host: String,

    /// Client IP reported to the server for gray releases.
    pub ip: Option<String>,

    /// Applications whose namespaces are synchronized.
    pub apps: Vec<AppConfig>,

    /// Polling mode settings.
    pub polling: PollingConfig,

    /// Long-polling mode settings.
    pub long_polling: LongPollingConfig,

    /// Backoff applied after failed fetches.
    pub retries: RetryConfig,

    /// Process manager reload settings.
    pub reload: ReloadConfig,

    /// Log output settings.
    pub logging: LoggingConfig,

    /// Metrics settings.
    pub observability: ObservabilityConfig,

    /// Top-level `logPath` of the legacy `app.yaml` layout. The loader folds
    /// it into `logging.directory`.
    #[serde(rename = "logPath", skip_serializing)]
    pub log_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cluster: "default".to_string(),
            mode: SyncMode::default(),
            host: String::new(),
            ip: None,
            apps: Vec::new(),
            polling: PollingConfig::default(),
            long_polling: LongPollingConfig::default(),
            retries: RetryConfig::default(),
            reload: ReloadConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
            log_path: None,
        }
    }
}

/// How a namespace is kept in sync with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Re-fetch the cached configuration on a fixed interval.
    Polling,
    /// Hold a notification request open and fetch only on change.
    #[default]
    Hot,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Polling => "polling",
            SyncMode::Hot => "hot",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SyncMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Older app.yaml files carry `type: 0` / `type: 1`.
impl<'de> Deserialize<'de> for SyncMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModeVisitor;

        impl Visitor<'_> for ModeVisitor {
            type Value = SyncMode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"polling\", \"hot\", 0 or 1")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SyncMode, E> {
                match v.to_ascii_lowercase().as_str() {
                    "polling" | "poll" => Ok(SyncMode::Polling),
                    "hot" | "long_polling" | "long-polling" => Ok(SyncMode::Hot),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<SyncMode, E> {
                match v {
                    0 => Ok(SyncMode::Polling),
                    1 => Ok(SyncMode::Hot),
                    other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<SyncMode, E> {
                match u64::try_from(v) {
                    Ok(v) => self.visit_u64(v),
                    Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(ModeVisitor)
    }
}

/// One application and the namespaces merged into its environment file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    /// Path of the effective environment file (e.g., "/srv/app/.env").
    pub path: PathBuf,

    /// Application identifier on the config server.
    #[serde(alias = "appId")]
    pub app_id: String,

    /// Namespaces in merge order.
    #[serde(alias = "namespace")]
    pub namespaces: Vec<String>,
}

impl AppConfig {
    /// Directory holding the namespace files and the environment file.
    pub fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn env_file(&self) -> &Path {
        &self.path
    }
}

/// Polling mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between two fetches of the cached endpoint.
    pub interval_secs: u64,

    /// Request timeout for the cached endpoint in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

/// Long-polling mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LongPollingConfig {
    /// Timeout for the notification request. The server holds it for
    /// up to 60 seconds, so this must stay above that.
    pub request_timeout_secs: u64,

    /// Timeout for the uncached configuration fetch in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for LongPollingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 90,
            fetch_timeout_secs: 10,
        }
    }
}

/// Backoff applied between failed fetches.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Process manager integration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    /// Control command to run after the environment file changes.
    pub command: String,

    /// Arguments passed to the control command.
    pub args: Vec<String>,

    /// Control socket; the command is skipped when it does not exist.
    pub socket_path: PathBuf,

    /// Quiet window for coalescing namespace file changes in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            command: "supervisorctl".to_string(),
            args: vec!["reload".to_string()],
            socket_path: PathBuf::from("/var/run/supervisor.sock"),
            debounce_ms: 200,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Directory for daily log files. Stdout only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
