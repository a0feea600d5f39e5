use std::time::Duration;

use statekeep_core::api::{Storage, STORAGE_TOPIC};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::cli::WatchArgs;
use crate::error::CliError;

pub async fn handle_watch(
    storage: &Storage,
    args: WatchArgs,
    default_interval_ms: u64,
) -> Result<i32, CliError> {
    // Load the known units so the poller has something to compare against.
    let known = storage.component_names().await?;
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(default_interval_ms).max(1));

    let mut events = storage.bus().subscribe(&STORAGE_TOPIC);
    let watcher = storage.spawn_watcher(interval);
    eprintln!(
        "watching {} unit(s), {} component(s), every {}ms; Ctrl-C to stop",
        storage.tracked_files().await.len(),
        known.len(),
        interval.as_millis()
    );

    let exit = loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let components = storage
                        .analyze_external_changes(std::slice::from_ref(&event))
                        .await
                        .unwrap_or_default();
                    let names: Vec<&str> = components.iter().map(String::as_str).collect();
                    println!(
                        "{} changed at {}: {}",
                        storage.macros().collapse(&event.file.path),
                        event.observed_at.to_rfc3339(),
                        if names.is_empty() { "-".to_string() } else { names.join(", ") }
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch output fell behind change events");
                }
                Err(RecvError::Closed) => break 0,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break 0;
            }
        }
    };

    watcher.abort();
    Ok(exit)
}
