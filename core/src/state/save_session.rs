//! Second half of a save cycle: deciding which units to write and writing
//! them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::externalization::ExternalizationSession;
use super::storage::{CycleGuard, Storage, UnitSnapshot, WriteOutcome};
use super::types::{PendingWrite, StorageFile};
use crate::codec::{Fingerprint, UnitDocument, UnitFormat};
use crate::error::{Result, StorageError};
use crate::events::ChangeEvent;

/// Components of this cycle grouped by the unit they go to.
struct PendingUnit {
    file: StorageFile,
    components: BTreeMap<String, Value>,
}

/// What writing one unit would produce right now.
struct UnitPlan {
    file: StorageFile,
    bytes: Vec<u8>,
    fingerprint: Fingerprint,
    /// On-disk fingerprint the bytes were computed from.
    base_fingerprint: Option<Fingerprint>,
    components: BTreeMap<String, Value>,
    dirty: bool,
}

/// Attempts per unit when the medium keeps changing under `save`.
const MAX_STALE_ATTEMPTS: usize = 3;

pub struct SaveSession {
    session_id: String,
    guard: CycleGuard,
    entries: BTreeMap<String, PendingWrite>,
    units: BTreeMap<PathBuf, PendingUnit>,
    written: Vec<StorageFile>,
}

impl std::fmt::Debug for SaveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveSession")
            .field("session_id", &self.session_id)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl SaveSession {
    pub(crate) fn new(session: ExternalizationSession) -> Self {
        let (session_id, guard, entries) = session.into_parts();
        let mut units: BTreeMap<PathBuf, PendingUnit> = BTreeMap::new();
        for (name, pending) in &entries {
            units
                .entry(pending.file.path.clone())
                .or_insert_with(|| PendingUnit {
                    file: pending.file.clone(),
                    components: BTreeMap::new(),
                })
                .components
                .insert(name.clone(), pending.value.clone());
        }

        Self {
            session_id,
            guard,
            entries,
            units,
            written: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn storage(&self) -> &Storage {
        self.guard.storage()
    }

    /// Components buffered in this cycle.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Units whose content would change if saved now: new units, units whose
    /// rendered bytes differ from the last known ones, and units changed on
    /// disk since they were last read or written.
    pub async fn get_storage_files_to_save(&self) -> Result<Vec<StorageFile>> {
        Ok(self
            .plan()
            .await?
            .into_iter()
            .filter(|p| p.dirty)
            .map(|p| p.file)
            .collect())
    }

    /// Every unit referenced by this session, dirty or not.
    pub fn get_all_storage_files(&self) -> Vec<StorageFile> {
        self.units.values().map(|u| u.file.clone()).collect()
    }

    pub fn get_used_macros(&self) -> BTreeSet<String> {
        self.units
            .values()
            .filter_map(|u| u.file.macro_name.clone())
            .collect()
    }

    /// Units written by `save` in this session.
    pub fn written_files(&self) -> &[StorageFile] {
        &self.written
    }

    /// Writes every dirty unit in path order.
    ///
    /// Staleness is re-checked here rather than taken from an earlier
    /// `get_storage_files_to_save`: each unit is compared with the medium
    /// right before it is planned, and again under the cache lock right
    /// before it is written. Stops at the first failing unit: units written
    /// before it stay written, later ones are untouched. Buffered state is
    /// never modified, so a failed save can simply be retried.
    pub async fn save(&mut self) -> Result<()> {
        debug!(
            storage = %self.storage().id(),
            session = %self.session_id,
            units = self.units.len(),
            "saving"
        );

        let paths: Vec<PathBuf> = self.units.keys().cloned().collect();
        for path in paths {
            if let Some(file) = self.save_unit(&self.units[&path]).await? {
                if !self.written.contains(&file) {
                    self.written.push(file);
                }
            }
        }
        Ok(())
    }

    /// Returns the unit when it had to be written.
    async fn save_unit(&self, pending: &PendingUnit) -> Result<Option<StorageFile>> {
        let storage = self.guard.storage();
        for _ in 0..MAX_STALE_ATTEMPTS {
            let plan = self.plan_unit(pending).await?;
            if !plan.dirty {
                self.route_all(pending, &plan.file);
                return Ok(None);
            }

            let snapshot = UnitSnapshot {
                file: plan.file.clone(),
                fingerprint: Some(plan.fingerprint),
                components: plan.components,
            };
            match storage
                .write_unit(snapshot, &plan.bytes, plan.base_fingerprint.as_ref())
                .await
            {
                Ok(WriteOutcome::Written) => {
                    info!(
                        storage = %storage.id(),
                        unit = %plan.file,
                        bytes = plan.bytes.len(),
                        "storage unit written"
                    );
                    self.route_all(pending, &plan.file);
                    return Ok(Some(plan.file));
                }
                Ok(WriteOutcome::Stale) => continue,
                Err(e) => {
                    warn!(storage = %storage.id(), unit = %plan.file, error = %e, "storage unit write failed");
                    return Err(e);
                }
            }
        }

        warn!(storage = %storage.id(), unit = %pending.file, "unit kept changing during save");
        Err(StorageError::io(
            pending.file.path.clone(),
            std::io::Error::new(
                std::io::ErrorKind::Other,
                "unit kept changing on the medium during save",
            ),
        ))
    }

    fn route_all(&self, pending: &PendingUnit, file: &StorageFile) {
        let storage = self.guard.storage();
        for name in pending.components.keys() {
            storage.route(name, file);
        }
    }

    /// Components made stale by `changed`, or `None` when none of this
    /// session's units (on this storage) are among them.
    ///
    /// Includes the components last read from a changed unit as well as the
    /// ones buffered for it in this cycle; buffered ones not yet written are
    /// reported as conflicts in the log.
    pub async fn analyze_external_changes(
        &self,
        changed: &[ChangeEvent],
    ) -> Option<BTreeSet<String>> {
        let storage = self.guard.storage();
        let hits: BTreeSet<&PathBuf> = changed
            .iter()
            .filter(|e| &e.storage == storage.id())
            .filter_map(|e| self.units.get_key_value(&e.file.path).map(|(k, _)| k))
            .collect();
        if hits.is_empty() {
            return None;
        }

        let mut stale = BTreeSet::new();
        for path in hits {
            let unit = &self.units[path];
            if let Some(snapshot) = storage.cached_snapshot(path).await {
                stale.extend(snapshot.components.into_keys());
            }
            stale.extend(storage.routed_to(path));

            let unsaved = !self.written.contains(&unit.file);
            for name in unit.components.keys() {
                if unsaved {
                    warn!(
                        storage = %storage.id(),
                        unit = %unit.file,
                        component = name.as_str(),
                        "unit changed externally while component has unsaved state"
                    );
                }
                stale.insert(name.clone());
            }
        }
        Some(stale)
    }

    async fn plan(&self) -> Result<Vec<UnitPlan>> {
        let mut plans = Vec::with_capacity(self.units.len());
        for pending in self.units.values() {
            plans.push(self.plan_unit(pending).await?);
        }
        Ok(plans)
    }

    /// Plans one unit against the medium. A tracked unit whose on-disk
    /// content diverged is reported on the bus first, then re-read so sibling
    /// components edited outside keep their on-disk value.
    async fn plan_unit(&self, pending: &PendingUnit) -> Result<UnitPlan> {
        let storage = self.guard.storage();
        let path = &pending.file.path;
        storage.confirm_change(path).await?;

        let externally_changed = storage.is_externally_changed(path);
        let base = match storage.cached_snapshot(path).await {
            Some(snapshot) if !externally_changed => snapshot,
            _ => storage.read_unit(&pending.file)?,
        };

        let mut components = base.components;
        for (name, value) in &pending.components {
            components.insert(name.clone(), value.clone());
        }

        let doc = UnitDocument::new(components);
        let bytes = doc.encode(UnitFormat::for_path(path), path)?;
        let fingerprint = Fingerprint::of(&bytes);
        let dirty = externally_changed || base.fingerprint.as_ref() != Some(&fingerprint);

        Ok(UnitPlan {
            file: pending.file.clone(),
            bytes,
            fingerprint,
            base_fingerprint: base.fingerprint,
            components: doc.components,
            dirty,
        })
    }
}
