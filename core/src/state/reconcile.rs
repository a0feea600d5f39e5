//! Detecting storage units changed outside this process.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::storage::Storage;
use crate::error::Result;
use crate::events::{ChangeEvent, STORAGE_TOPIC};

impl Storage {
    /// Re-reads every tracked unit and publishes one event per unit whose
    /// content diverged since it was last read or written. A divergence is
    /// reported once; it is reported again only if the content changes again.
    pub async fn check_external_changes(&self) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        for file in self.tracked_files().await {
            if let Some(event) = self.confirm_change(&file.path).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Entry point for an outside watcher that saw `path` change. The change
    /// is confirmed by re-reading the unit before anything is published.
    pub async fn notify_file_changed(&self, path: &Path) -> Result<Option<ChangeEvent>> {
        self.confirm_change(path).await
    }

    pub(crate) async fn confirm_change(&self, path: &Path) -> Result<Option<ChangeEvent>> {
        let Some(file) = self.reconcile_unit(path).await? else {
            return Ok(None);
        };
        let event = ChangeEvent::new(file, self.id().clone());
        let delivered = self.bus().publish(&STORAGE_TOPIC, event.clone());
        info!(
            storage = %self.id(),
            unit = %event.file,
            delivered,
            "storage unit changed externally"
        );
        Ok(Some(event))
    }

    /// Components backed by the changed units of this storage, from what was
    /// last read from or saved to them. `None` when no such unit is known.
    pub async fn analyze_external_changes(
        &self,
        changed: &[ChangeEvent],
    ) -> Option<BTreeSet<String>> {
        let paths: BTreeSet<&Path> = changed
            .iter()
            .filter(|e| &e.storage == self.id())
            .map(|e| e.file.path.as_path())
            .collect();

        let mut stale = BTreeSet::new();
        let mut known = false;
        for path in paths {
            if let Some(snapshot) = self.cached_snapshot(path).await {
                known = true;
                stale.extend(snapshot.components.into_keys());
            }
            let routed = self.routed_to(path);
            known |= !routed.is_empty();
            stale.extend(routed);
        }
        known.then_some(stale)
    }

    /// Polls `check_external_changes` every `interval` until the handle is
    /// aborted. Failed checks are logged and retried on the next tick.
    pub fn spawn_watcher(&self, interval: Duration) -> JoinHandle<()> {
        let storage = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(storage = %storage.id(), ?interval, "storage watcher started");
            loop {
                ticker.tick().await;
                match storage.check_external_changes().await {
                    Ok(events) if !events.is_empty() => {
                        debug!(storage = %storage.id(), changed = events.len(), "watcher tick");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(storage = %storage.id(), error = %e, "external change check failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StorageListener;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_unit(path: &Path, components: serde_json::Value) {
        let doc = json!({"version": 1, "components": components});
        std::fs::write(path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    }

    async fn saved_storage(dir: &TempDir) -> Storage {
        let storage = Storage::builder("t").root(dir.path()).build().unwrap();
        let mut session = storage.start_externalization().await;
        session.set_state("Foo", &json!({"x": 1}), None).unwrap();
        let mut save = storage.start_save(session).unwrap();
        save.save().await.unwrap();
        storage.finish_save(save).unwrap();
        storage
    }

    #[tokio::test]
    async fn test_own_writes_are_not_external() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        assert!(storage.check_external_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_reported_once() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        storage.bus().connect(
            &STORAGE_TOPIC,
            Arc::new(move |_: &ChangeEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        write_unit(&dir.path().join("state.json"), json!({"Foo": {"x": 2}}));
        let events = storage.check_external_changes().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file.path, dir.path().join("state.json"));
        assert!(storage.is_externally_changed(&dir.path().join("state.json")));

        assert!(storage.check_external_changes().await.unwrap().is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    struct Recorder(parking_lot::Mutex<Vec<PathBuf>>);

    impl StorageListener for Recorder {
        fn storage_file_changed(&self, event: &ChangeEvent) {
            self.0.lock().push(event.file.path.clone());
        }
    }

    #[tokio::test]
    async fn test_storage_listener_receives_changes() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        let recorder = Arc::new(Recorder(parking_lot::Mutex::new(Vec::new())));
        storage.add_listener(recorder.clone());

        write_unit(&dir.path().join("state.json"), json!({"Foo": {"x": 2}}));
        storage.check_external_changes().await.unwrap();
        assert_eq!(*recorder.0.lock(), vec![dir.path().join("state.json")]);
    }

    #[tokio::test]
    async fn test_notify_untracked_path_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        let other = dir.path().join("other.json");
        write_unit(&other, json!({}));
        assert_eq!(storage.notify_file_changed(&other).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reverted_change_clears_mark() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        let path = dir.path().join("state.json");
        let original = std::fs::read(&path).unwrap();

        write_unit(&path, json!({"Foo": {"x": 2}}));
        assert!(storage.notify_file_changed(&path).await.unwrap().is_some());

        std::fs::write(&path, original).unwrap();
        assert_eq!(storage.notify_file_changed(&path).await.unwrap(), None);
        assert!(!storage.is_externally_changed(&path));
    }

    #[tokio::test]
    async fn test_analyze_after_cycle() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        write_unit(&dir.path().join("state.json"), json!({"Foo": {"x": 2}}));

        let events = storage.check_external_changes().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            storage.analyze_external_changes(&events).await,
            Some(BTreeSet::from(["Foo".to_string()]))
        );

        let foreign: Vec<_> = events
            .iter()
            .map(|e| ChangeEvent::new(e.file.clone(), "other".into()))
            .collect();
        assert_eq!(storage.analyze_external_changes(&foreign).await, None);
    }

    #[tokio::test]
    async fn test_watcher_publishes() {
        let dir = TempDir::new().unwrap();
        let storage = saved_storage(&dir).await;
        let mut rx = storage.bus().subscribe(&STORAGE_TOPIC);
        let handle = storage.spawn_watcher(Duration::from_millis(10));

        write_unit(&dir.path().join("state.json"), json!({"Foo": {"x": 3}}));
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.storage, *storage.id());
        handle.abort();
    }
}
