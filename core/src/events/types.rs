use chrono::{DateTime, Utc};
use serde::Serialize;

use super::bus::{BroadcastDirection, Topic};
use crate::state::types::{StorageFile, StorageId};

/// Topic every storage publishes confirmed external file changes on.
/// Events travel from the publishing bus up to the root.
pub const STORAGE_TOPIC: Topic = Topic {
    name: "STORAGE_LISTENER",
    direction: BroadcastDirection::ToParent,
};

/// A storage unit whose on-disk content diverged from what this process last
/// read or wrote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeEvent {
    pub file: StorageFile,
    pub storage: StorageId,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(file: StorageFile, storage: StorageId) -> Self {
        Self {
            file,
            storage,
            observed_at: Utc::now(),
        }
    }
}

/// Receiver of confirmed external changes, registered with
/// [`Storage::add_listener`](crate::state::Storage::add_listener).
pub trait StorageListener: Send + Sync {
    fn storage_file_changed(&self, event: &ChangeEvent);
}
