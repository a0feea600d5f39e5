//! Identity and routing types shared by the storage facade and its sessions.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a `Storage` instance, carried by change events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageId(String);

impl StorageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StorageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StorageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for StorageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a component's state should live, e.g. `$ROOT$/ui.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageSpec {
    pub file: String,
}

impl StorageSpec {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

impl From<&str> for StorageSpec {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A resolved physical storage unit. Equality and ordering use the path
/// only; two specs that resolve to the same file are the same unit.
#[derive(Debug, Clone, Serialize)]
pub struct StorageFile {
    pub path: PathBuf,
    pub spec: String,
    pub macro_name: Option<String>,
}

impl PartialEq for StorageFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for StorageFile {}

impl Hash for StorageFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for StorageFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StorageFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl std::fmt::Display for StorageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.spec.is_empty() {
            write!(f, "{}", self.path.display())
        } else {
            f.write_str(&self.spec)
        }
    }
}

/// One buffered component state, waiting for its unit to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub value: Value,
    pub file: StorageFile,
}

/// Phase of the save cycle of one `Storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    /// 空闲
    Idle,
    /// 收集组件状态
    Externalizing,
    /// 写入存储单元
    Saving,
}
