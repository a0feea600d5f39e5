//! The storage facade: reads component state and runs save cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::externalization::ExternalizationSession;
use super::save_session::SaveSession;
use super::transitions::PhaseTransition;
use super::types::{CyclePhase, StorageFile, StorageId, StorageSpec};
use crate::codec::{self, Fingerprint, UnitDocument, UnitFormat};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::events::{ChangeEvent, MessageBus, StorageListener, STORAGE_TOPIC};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::macros::{PathMacros, ROOT_MACRO};

pub const DEFAULT_SPEC: &str = "$ROOT$/state.json";
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Last known content of one storage unit.
#[derive(Debug, Clone)]
pub(crate) struct UnitSnapshot {
    pub file: StorageFile,
    /// `None` when the unit did not exist.
    pub fingerprint: Option<Fingerprint>,
    pub components: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Written,
    /// The unit changed on the medium since the bytes were planned.
    Stale,
}

/// Entry point for reading component state and for saving it.
///
/// Cloning is cheap; clones share caches and the cycle lock. At most one
/// save cycle is in flight per storage: `start_externalization` waits for
/// the previous cycle's `finish_save` (or for its sessions to be dropped).
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    id: StorageId,
    macros: PathMacros,
    default_file: StorageFile,
    known_files: Vec<StorageFile>,
    fs: Arc<dyn FileSystem>,
    bus: MessageBus<ChangeEvent>,
    cycle: Arc<AsyncMutex<()>>,
    phase: Mutex<CyclePhase>,
    /// Unit snapshots, replaced whole so readers never see a torn unit.
    units: RwLock<BTreeMap<PathBuf, UnitSnapshot>>,
    /// Component name -> unit it was last saved to or found in.
    routes: Mutex<HashMap<String, StorageFile>>,
    /// Units whose on-disk content diverged, with the fingerprint observed.
    external: Mutex<HashMap<PathBuf, Option<Fingerprint>>>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("id", &self.inner.id)
            .field("default_file", &self.inner.default_file)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Holds the cycle lock for the lifetime of an externalization/save session
/// pair and returns the storage to `Idle` when released.
pub(crate) struct CycleGuard {
    storage: Storage,
    _lock: OwnedMutexGuard<()>,
}

impl CycleGuard {
    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let mut phase = self.storage.inner.phase.lock();
        if *phase != CyclePhase::Idle {
            debug!(storage = %self.storage.inner.id, from = ?*phase, "save cycle released");
            *phase = CyclePhase::Idle;
        }
    }
}

impl Storage {
    pub fn builder(id: impl Into<StorageId>) -> StorageBuilder {
        StorageBuilder::new(id)
    }

    pub fn open(config: &StorageConfig) -> Result<Self> {
        let mut builder = Self::builder(config.storage_id.as_str())
            .default_spec(StorageSpec::new(config.default_file.as_str()))
            .bus(MessageBus::new(config.events.channel_capacity));
        for (name, path) in &config.macros {
            if name == ROOT_MACRO {
                warn!(
                    storage = %config.storage_id,
                    ignored = %path.display(),
                    "ROOT macro is bound to root_dir; config entry ignored"
                );
                continue;
            }
            builder = builder.macro_path(name.as_str(), path);
        }
        for unit in &config.units {
            builder = builder.unit(StorageSpec::new(unit.as_str()));
        }
        builder.root(&config.root_dir).build()
    }

    pub fn id(&self) -> &StorageId {
        &self.inner.id
    }

    pub fn bus(&self) -> &MessageBus<ChangeEvent> {
        &self.inner.bus
    }

    /// Connects `listener` to [`STORAGE_TOPIC`] on this storage's bus. It is
    /// called synchronously for every change published here or below.
    pub fn add_listener(&self, listener: Arc<dyn StorageListener>) {
        self.inner.bus.connect(
            &STORAGE_TOPIC,
            Arc::new(move |event: &ChangeEvent| listener.storage_file_changed(event)),
        );
    }

    pub fn macros(&self) -> &PathMacros {
        &self.inner.macros
    }

    pub fn default_file(&self) -> &StorageFile {
        &self.inner.default_file
    }

    pub fn phase(&self) -> CyclePhase {
        *self.inner.phase.lock()
    }

    pub fn resolve_spec(&self, spec: &StorageSpec) -> Result<StorageFile> {
        resolve(&self.inner.macros, spec)
    }

    fn same_as(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- reading state ----

    /// Returns the stored state of `component_name`, or `None` when nothing
    /// is recorded. With `merge_into`, fields the stored data does not
    /// mention keep their value from `merge_into`.
    pub async fn get_state<T>(&self, component_name: &str, merge_into: Option<T>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Serialize,
    {
        let Some(stored) = self.load_component(component_name).await? else {
            return Ok(None);
        };
        let value = match merge_into {
            Some(existing) => {
                codec::merge_into(codec::to_internal(component_name, &existing)?, stored)
            }
            None => stored,
        };
        codec::from_internal(component_name, value).map(Some)
    }

    /// Presence check. Units that are not cached yet are read but not cached.
    pub async fn has_state(&self, component_name: &str) -> Result<bool> {
        for file in self.candidate_files(component_name) {
            let cached = self
                .inner
                .units
                .read()
                .await
                .get(&file.path)
                .map(|s| s.components.contains_key(component_name));
            let present = match cached {
                Some(present) => present,
                None => self.read_unit(&file)?.components.contains_key(component_name),
            };
            if present {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Names of every component found in the known units.
    pub async fn component_names(&self) -> Result<BTreeSet<String>> {
        let mut files = vec![self.inner.default_file.clone()];
        files.extend(self.inner.known_files.iter().cloned());
        for file in &files {
            self.ensure_loaded(file).await?;
        }

        let mut names: BTreeSet<String> = self
            .inner
            .units
            .read()
            .await
            .values()
            .flat_map(|s| s.components.keys().cloned())
            .collect();
        names.extend(self.inner.routes.lock().keys().cloned());
        Ok(names)
    }

    /// Units this storage currently holds a snapshot of.
    pub async fn tracked_files(&self) -> Vec<StorageFile> {
        self.inner
            .units
            .read()
            .await
            .values()
            .map(|s| s.file.clone())
            .collect()
    }

    async fn load_component(&self, component_name: &str) -> Result<Option<Value>> {
        for file in self.candidate_files(component_name) {
            let found = self
                .ensure_loaded(&file)
                .await?
                .components
                .get(component_name)
                .cloned();
            if let Some(value) = found {
                self.inner
                    .routes
                    .lock()
                    .entry(component_name.to_string())
                    .or_insert(file);
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Route first, then the default unit, then the configured units.
    fn candidate_files(&self, component_name: &str) -> Vec<StorageFile> {
        let mut files = Vec::with_capacity(self.inner.known_files.len() + 2);
        if let Some(routed) = self.inner.routes.lock().get(component_name) {
            files.push(routed.clone());
        }
        for file in std::iter::once(&self.inner.default_file).chain(&self.inner.known_files) {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }

    async fn ensure_loaded(&self, file: &StorageFile) -> Result<UnitSnapshot> {
        if let Some(snapshot) = self.cached_snapshot(&file.path).await {
            return Ok(snapshot);
        }
        let snapshot = self.read_unit(file)?;
        let mut units = self.inner.units.write().await;
        // Another reader may have loaded it meanwhile; keep the first copy.
        let snapshot = units
            .entry(file.path.clone())
            .or_insert(snapshot)
            .clone();
        Ok(snapshot)
    }

    pub(crate) fn read_unit(&self, file: &StorageFile) -> Result<UnitSnapshot> {
        let bytes = self
            .inner
            .fs
            .read(&file.path)
            .map_err(|e| StorageError::io(file.path.clone(), e))?;
        let Some(bytes) = bytes else {
            return Ok(UnitSnapshot {
                file: file.clone(),
                fingerprint: None,
                components: BTreeMap::new(),
            });
        };
        let doc = UnitDocument::decode(UnitFormat::for_path(&file.path), &file.path, &bytes)?;
        Ok(UnitSnapshot {
            file: file.clone(),
            fingerprint: Some(Fingerprint::of(&bytes)),
            components: doc.components,
        })
    }

    pub(crate) async fn cached_snapshot(&self, path: &Path) -> Option<UnitSnapshot> {
        self.inner.units.read().await.get(path).cloned()
    }

    /// Installs `snapshot` as the last known content of its unit.
    pub(crate) async fn commit_snapshot(&self, snapshot: UnitSnapshot) {
        let path = snapshot.file.path.clone();
        self.inner.units.write().await.insert(path.clone(), snapshot);
        self.inner.external.lock().remove(&path);
    }

    pub(crate) fn route(&self, component_name: &str, file: &StorageFile) {
        self.inner
            .routes
            .lock()
            .insert(component_name.to_string(), file.clone());
    }

    pub(crate) fn routed_to(&self, path: &Path) -> BTreeSet<String> {
        self.inner
            .routes
            .lock()
            .iter()
            .filter(|(_, file)| file.path == path)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_externally_changed(&self, path: &Path) -> bool {
        self.inner.external.lock().contains_key(path)
    }

    /// Writes `bytes` and installs `snapshot` under one cache lock, so a
    /// concurrent `reconcile_unit` never sees the new bytes against the old
    /// snapshot.
    ///
    /// `expected` is the on-disk fingerprint the bytes were computed from.
    /// When the medium no longer holds it, nothing is written and
    /// `WriteOutcome::Stale` is returned.
    pub(crate) async fn write_unit(
        &self,
        snapshot: UnitSnapshot,
        bytes: &[u8],
        expected: Option<&Fingerprint>,
    ) -> Result<WriteOutcome> {
        let path = snapshot.file.path.clone();
        let mut units = self.inner.units.write().await;

        let on_disk = self
            .inner
            .fs
            .read(&path)
            .map_err(|e| StorageError::io(path.clone(), e))?
            .map(|bytes| Fingerprint::of(&bytes));
        if on_disk.as_ref() != expected {
            debug!(storage = %self.inner.id, unit = %snapshot.file, "unit changed under save");
            return Ok(WriteOutcome::Stale);
        }

        self.inner
            .fs
            .write_atomic(&path, bytes)
            .map_err(|e| StorageError::io(path.clone(), e))?;
        units.insert(path.clone(), snapshot);
        self.inner.external.lock().remove(&path);
        Ok(WriteOutcome::Written)
    }

    /// Compares a tracked unit with the medium and updates its external
    /// mark. Returns the unit when it diverged in a way not reported before;
    /// untracked paths are ignored.
    pub(crate) async fn reconcile_unit(&self, path: &Path) -> Result<Option<StorageFile>> {
        let units = self.inner.units.read().await;
        let Some(snapshot) = units.get(path) else {
            return Ok(None);
        };
        let observed = self
            .inner
            .fs
            .read(path)
            .map_err(|e| StorageError::io(path.to_path_buf(), e))?
            .map(|bytes| Fingerprint::of(&bytes));

        let mut external = self.inner.external.lock();
        if observed == snapshot.fingerprint {
            external.remove(path);
            return Ok(None);
        }
        if external.get(path) == Some(&observed) {
            return Ok(None);
        }
        external.insert(path.to_path_buf(), observed);
        Ok(Some(snapshot.file.clone()))
    }

    // ---- save cycle ----

    /// Opens a save cycle, waiting for any cycle already in flight.
    pub async fn start_externalization(&self) -> ExternalizationSession {
        let lock = Arc::clone(&self.inner.cycle).lock_owned().await;
        ExternalizationSession::new(self.enter_cycle(lock))
    }

    /// Like `start_externalization`, but fails instead of waiting.
    pub fn try_start_externalization(&self) -> Result<ExternalizationSession> {
        let lock = Arc::clone(&self.inner.cycle)
            .try_lock_owned()
            .map_err(|_| {
                StorageError::misuse(format!(
                    "storage '{}' already has a save cycle in flight ({})",
                    self.inner.id,
                    PhaseTransition::phase_description(self.phase())
                ))
            })?;
        Ok(ExternalizationSession::new(self.enter_cycle(lock)))
    }

    fn enter_cycle(&self, lock: OwnedMutexGuard<()>) -> CycleGuard {
        // Holding the cycle lock means the previous guard has already reset
        // the phase to Idle.
        *self.inner.phase.lock() = CyclePhase::Externalizing;
        debug!(storage = %self.inner.id, "externalization started");
        CycleGuard {
            storage: self.clone(),
            _lock: lock,
        }
    }

    pub fn start_save(&self, session: ExternalizationSession) -> Result<SaveSession> {
        if !self.same_as(session.storage()) {
            return Err(StorageError::ForeignSession {
                expected: self.inner.id.to_string(),
                found: session.storage().id().to_string(),
            });
        }
        self.transition(CyclePhase::Saving)?;
        debug!(
            storage = %self.inner.id,
            session = session.session_id(),
            components = session.len(),
            "save started"
        );
        Ok(SaveSession::new(session))
    }

    pub fn finish_save(&self, session: SaveSession) -> Result<()> {
        if !self.same_as(session.storage()) {
            return Err(StorageError::ForeignSession {
                expected: self.inner.id.to_string(),
                found: session.storage().id().to_string(),
            });
        }
        self.transition(CyclePhase::Idle)?;
        debug!(
            storage = %self.inner.id,
            session = session.session_id(),
            written = session.written_files().len(),
            "save cycle finished"
        );
        drop(session);
        Ok(())
    }

    fn transition(&self, to: CyclePhase) -> Result<()> {
        let mut phase = self.inner.phase.lock();
        PhaseTransition::validate(*phase, to)?;
        *phase = to;
        Ok(())
    }

    /// Re-reads the units backing `changed_components` so the next
    /// `get_state` sees their current on-disk content. Unknown names are
    /// ignored. Rejected while a save cycle is in flight.
    pub async fn reload<I, S>(&self, changed_components: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Held for the whole reload so no cycle can start halfway through.
        let _cycle = self.inner.cycle.try_lock().map_err(|_| {
            StorageError::misuse(format!(
                "reload on storage '{}' while {}",
                self.inner.id,
                PhaseTransition::phase_description(self.phase())
            ))
        })?;

        let names: BTreeSet<String> = changed_components
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut files: BTreeSet<StorageFile> = {
            let routes = self.inner.routes.lock();
            names.iter().filter_map(|n| routes.get(n).cloned()).collect()
        };
        files.extend(
            self.inner
                .units
                .read()
                .await
                .values()
                .filter(|s| names.iter().any(|n| s.components.contains_key(n)))
                .map(|s| s.file.clone()),
        );

        for file in files {
            let snapshot = self.read_unit(&file)?;
            info!(
                storage = %self.inner.id,
                unit = %file,
                components = snapshot.components.len(),
                "storage unit reloaded"
            );
            {
                let mut routes = self.inner.routes.lock();
                for name in snapshot.components.keys() {
                    routes.entry(name.clone()).or_insert_with(|| file.clone());
                }
            }
            self.commit_snapshot(snapshot).await;
        }
        Ok(())
    }
}

fn resolve(macros: &PathMacros, spec: &StorageSpec) -> Result<StorageFile> {
    let resolved = macros.resolve(&spec.file)?;
    Ok(StorageFile {
        path: resolved.path,
        spec: spec.file.clone(),
        macro_name: resolved.macro_name,
    })
}

pub struct StorageBuilder {
    id: StorageId,
    macros: PathMacros,
    default_spec: StorageSpec,
    units: Vec<StorageSpec>,
    fs: Option<Arc<dyn FileSystem>>,
    bus: Option<MessageBus<ChangeEvent>>,
}

impl StorageBuilder {
    pub fn new(id: impl Into<StorageId>) -> Self {
        Self {
            id: id.into(),
            macros: PathMacros::default(),
            default_spec: StorageSpec::new(DEFAULT_SPEC),
            units: Vec::new(),
            fs: None,
            bus: None,
        }
    }

    /// Binds the `ROOT` macro.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.macros.insert(ROOT_MACRO, root);
        self
    }

    pub fn macro_path(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.macros.insert(name, path);
        self
    }

    pub fn default_spec(mut self, spec: impl Into<StorageSpec>) -> Self {
        self.default_spec = spec.into();
        self
    }

    /// Adds a unit searched for components that have no known route.
    pub fn unit(mut self, spec: impl Into<StorageSpec>) -> Self {
        self.units.push(spec.into());
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Bus the storage publishes change events on; use `parent.child()` to
    /// aggregate several storages under one parent bus.
    pub fn bus(mut self, bus: MessageBus<ChangeEvent>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Storage> {
        let default_file = resolve(&self.macros, &self.default_spec)?;
        let known_files = self
            .units
            .iter()
            .map(|spec| resolve(&self.macros, spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Storage {
            inner: Arc::new(StorageInner {
                id: self.id,
                macros: self.macros,
                default_file,
                known_files,
                fs: self.fs.unwrap_or_else(|| Arc::new(LocalFileSystem)),
                bus: self
                    .bus
                    .unwrap_or_else(|| MessageBus::new(DEFAULT_CHANNEL_CAPACITY)),
                cycle: Arc::new(AsyncMutex::new(())),
                phase: Mutex::new(CyclePhase::Idle),
                units: RwLock::new(BTreeMap::new()),
                routes: Mutex::new(HashMap::new()),
                external: Mutex::new(HashMap::new()),
            }),
        })
    }
}
