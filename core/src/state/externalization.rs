//! First half of a save cycle: collecting component state.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::storage::{CycleGuard, Storage};
use super::types::{PendingWrite, StorageSpec};
use crate::codec::{self, UnitFormat};
use crate::error::Result;

/// Buffers component state for one save cycle. Nothing touches the medium
/// until the paired `SaveSession::save`, so dropping this session abandons
/// the cycle without side effects.
pub struct ExternalizationSession {
    session_id: String,
    guard: CycleGuard,
    entries: BTreeMap<String, PendingWrite>,
}

impl std::fmt::Debug for ExternalizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalizationSession")
            .field("session_id", &self.session_id)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl ExternalizationSession {
    pub(crate) fn new(guard: CycleGuard) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            guard,
            entries: BTreeMap::new(),
        }
    }

    /// Records `state` for `component_name`, replacing any earlier entry for
    /// the same component in this session. Without `storage_spec` the
    /// storage's default unit is used.
    pub fn set_state<T>(
        &mut self,
        component_name: &str,
        state: &T,
        storage_spec: Option<&StorageSpec>,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = codec::to_internal(component_name, state)?;
        let storage = self.guard.storage();
        let file = match storage_spec {
            Some(spec) => storage.resolve_spec(spec)?,
            None => storage.default_file().clone(),
        };
        UnitFormat::for_path(&file.path).check_encodable(component_name, &value)?;

        debug!(
            storage = %storage.id(),
            component = component_name,
            unit = %file,
            "component state externalized"
        );
        let previous = self
            .entries
            .insert(component_name.to_string(), PendingWrite { value, file });
        if previous.is_some() {
            debug!(component = component_name, "replaced earlier state in this session");
        }
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn storage(&self) -> &Storage {
        self.guard.storage()
    }

    pub fn get(&self, component_name: &str) -> Option<&PendingWrite> {
        self.entries.get(component_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_parts(self) -> (String, CycleGuard, BTreeMap<String, PendingWrite>) {
        (self.session_id, self.guard, self.entries)
    }
}
