use clap::Parser;
use statekeep_cli::commands::{self, cli, store, watch};
use statekeep_cli::error::CliError;
use statekeep_core::api::{Storage, StorageConfig};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = commands::resolve_config(&args)?;
    let watching = matches!(args.command, cli::Commands::Watch(_));
    init_tracing(&cfg, watching).map_err(CliError::Command)?;

    let storage = Storage::open(&cfg)?;
    tracing::debug!(storage = %storage.id(), root = %cfg.root_dir.display(), "storage opened");

    match args.command {
        cli::Commands::Get(get_args) => store::handle_get(&storage, get_args).await,
        cli::Commands::Set(set_args) => store::handle_set(&storage, set_args).await,
        cli::Commands::List => store::handle_list(&storage).await,
        cli::Commands::Watch(watch_args) => {
            watch::handle_watch(&storage, watch_args, cfg.watch.poll_interval_ms).await
        }
    }
}

/// 日志文件位置: `directory` 优先, 否则落在存储根目录下的 `logs/`
fn log_file_target(cfg: &StorageConfig, watching: bool) -> (PathBuf, String) {
    let dir = cfg
        .logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.root_dir.join("logs"));

    // watch 是长驻进程, 按天滚动; 一次性命令按 pid 区分
    let name = if watching {
        format!("statekeep-{}-watch.log", cfg.storage_id)
    } else {
        format!("statekeep-{}.{}.log", cfg.storage_id, std::process::id())
    };
    (dir, name)
}

fn init_tracing(cfg: &StorageConfig, watching: bool) -> Result<(), String> {
    let logging = &cfg.logging;
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(&logging.level).map_err(|e| e.to_string())?,
    };

    let file_writer = if logging.file {
        let (dir, name) = log_file_target(cfg, watching);
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("create log dir {} failed: {e}", dir.display()))?;
        let appender = if watching {
            tracing_appender::rolling::daily(dir, name)
        } else {
            tracing_appender::rolling::never(dir, name)
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(writer)
    } else {
        None
    };

    if !logging.console && file_writer.is_none() {
        return Err("logging enabled but neither console nor file output is on".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });
    let file_layer = file_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_defaults_under_root_dir() {
        let mut cfg = StorageConfig::with_root("/srv/app");
        cfg.storage_id = "ui".into();

        let (dir, name) = log_file_target(&cfg, true);
        assert_eq!(dir, PathBuf::from("/srv/app/logs"));
        assert_eq!(name, "statekeep-ui-watch.log");

        let (_, name) = log_file_target(&cfg, false);
        assert!(name.starts_with("statekeep-ui.") && name.ends_with(".log"));

        cfg.logging.directory = Some("  /var/log/sk ".into());
        assert_eq!(log_file_target(&cfg, false).0, PathBuf::from("/var/log/sk"));
    }
}
