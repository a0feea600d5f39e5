use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_id")]
    pub storage_id: String,

    /// Directory bound to the `ROOT` macro.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Storage spec used when a component is saved without one.
    #[serde(default = "default_file")]
    pub default_file: String,

    /// Extra storage specs searched when a component has no known route.
    #[serde(default)]
    pub units: Vec<String>,

    /// Additional path macros, e.g. `CACHE = "/var/cache/app"`.
    #[serde(default)]
    pub macros: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_storage_id() -> String {
    "default".to_string()
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".statekeep")
}

fn default_file() -> String {
    "$ROOT$/state.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_id: default_storage_id(),
            root_dir: default_root_dir(),
            default_file: default_file(),
            units: Vec::new(),
            macros: BTreeMap::new(),
            watch: WatchConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (`<root_dir>/logs` if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "statekeep_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: StorageConfig = toml::from_str(
            r#"
            storage_id = "workspace"
            root_dir = "/srv/app"

            [macros]
            CACHE = "/var/cache/app"

            [watch]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage_id, "workspace");
        assert_eq!(cfg.default_file, "$ROOT$/state.json");
        assert_eq!(cfg.macros["CACHE"], PathBuf::from("/var/cache/app"));
        assert_eq!(cfg.watch.poll_interval_ms, 250);
        assert_eq!(cfg.events.channel_capacity, 256);
        assert!(cfg.logging.enabled);
    }
}
