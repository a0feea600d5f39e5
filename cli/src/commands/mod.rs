pub mod cli;
pub mod store;
pub mod watch;

use statekeep_core::api::{self as core_api, StorageConfig};

use crate::error::CliError;

/// Loads the config named by `--config` (or found by the default search)
/// and applies `--root` on top of it.
pub fn resolve_config(args: &cli::Args) -> Result<StorageConfig, CliError> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => core_api::load_from_path(path),
        None => core_api::load_default(),
    }
    .map_err(|e| CliError::Config(format!("{e:#}")))?;

    if let Some(root) = &args.root {
        cfg.root_dir = root.clone();
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn root_flag_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statekeep.toml");
        std::fs::write(&path, "storage_id = \"proj\"\nroot_dir = \"/from/config\"\n").unwrap();

        let args = cli::Args::try_parse_from([
            "statekeep",
            "list",
            "--config",
            path.to_str().unwrap(),
            "--root",
            "/from/flag",
        ])
        .unwrap();
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.storage_id, "proj");
        assert_eq!(cfg.root_dir, std::path::PathBuf::from("/from/flag"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let args = cli::Args::try_parse_from([
            "statekeep",
            "list",
            "--config",
            "/definitely/not/here.toml",
        ])
        .unwrap();
        let err = resolve_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }
}
