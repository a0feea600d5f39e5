//! Stable re-exports for consumers (`cli` and external crates).
//!
//! Prefer importing from `statekeep_core::api` instead of reaching into internal modules.

pub use crate::codec::{Fingerprint, UnitDocument, UnitFormat};
pub use crate::config::{
    load_default, load_from_path, EventsConfig, LoggingConfig, StorageConfig, WatchConfig,
};
pub use crate::error::{ErrorKind, Result, StorageError};
pub use crate::events::{
    BroadcastDirection, ChangeEvent, Listener, MessageBus, StorageListener, Topic, STORAGE_TOPIC,
};
pub use crate::fs::{FileSystem, LocalFileSystem};
pub use crate::macros::{PathMacros, ResolvedUnit, ROOT_MACRO};
pub use crate::state::{
    CyclePhase, ExternalizationSession, SaveSession, Storage, StorageBuilder, StorageFile,
    StorageId, StorageSpec, DEFAULT_SPEC,
};
