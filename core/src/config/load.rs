use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::StorageConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "STATEKEEP_CONFIG";
pub const LOCAL_CONFIG_FILE: &str = "statekeep.toml";

pub fn load_from_path(path: &Path) -> anyhow::Result<StorageConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    toml::from_str::<StorageConfig>(&s).with_context(|| format!("Invalid config {:?}", path))
}

pub fn load_default() -> anyhow::Result<StorageConfig> {
    // Priority 1: $STATEKEEP_CONFIG
    let explicit = std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    // Priority 2: ./statekeep.toml (current directory)
    let local_config = Path::new(LOCAL_CONFIG_FILE);

    let mut cfg = match explicit {
        Some(path) => load_from_path(&path)?,
        None if local_config.exists() => load_from_path(local_config)?,
        None => StorageConfig::default(),
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut StorageConfig) {
    if let Ok(v) = std::env::var("STATEKEEP_ROOT") {
        if !v.trim().is_empty() {
            cfg.root_dir = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("STATEKEEP_STORAGE_ID") {
        if !v.trim().is_empty() {
            cfg.storage_id = v;
        }
    }
    if let Ok(v) = std::env::var("STATEKEEP_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
}
