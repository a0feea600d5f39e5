#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statekeep_core::api::{FileSystem, LocalFileSystem, MessageBus, Storage};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foo {
    pub x: i64,
}

/// Local file system that fails reads or writes to paths ending with one of
/// the configured suffixes.
#[derive(Default)]
pub struct FaultyFileSystem {
    failing: Mutex<BTreeSet<String>>,
    failing_reads: Mutex<BTreeSet<String>>,
    writes: Mutex<Vec<PathBuf>>,
}

fn matches_any(suffixes: &Mutex<BTreeSet<String>>, path: &Path) -> bool {
    let name = path.to_string_lossy();
    suffixes.lock().iter().any(|s| name.ends_with(s.as_str()))
}

fn injected() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "injected failure")
}

impl FaultyFileSystem {
    pub fn fail_writes_to(&self, suffix: &str) {
        self.failing.lock().insert(suffix.to_string());
    }

    pub fn fail_reads_to(&self, suffix: &str) {
        self.failing_reads.lock().insert(suffix.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        self.failing_reads.lock().clear();
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().clone()
    }
}

impl FileSystem for FaultyFileSystem {
    fn read(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        if matches_any(&self.failing_reads, path) {
            return Err(injected());
        }
        LocalFileSystem.read(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if matches_any(&self.failing, path) {
            return Err(injected());
        }
        LocalFileSystem.write_atomic(path, bytes)?;
        self.writes.lock().push(path.to_path_buf());
        Ok(())
    }
}

pub fn storage(dir: &TempDir) -> Storage {
    Storage::builder("fixture")
        .root(dir.path())
        .macro_path("CACHE", dir.path().join("cache"))
        .build()
        .unwrap()
}

pub fn storage_on(dir: &TempDir, fs: Arc<FaultyFileSystem>) -> Storage {
    Storage::builder("fixture")
        .root(dir.path())
        .macro_path("CACHE", dir.path().join("cache"))
        .file_system(fs)
        .build()
        .unwrap()
}

pub fn storage_with_bus(dir: &TempDir, id: &str, bus: MessageBus<statekeep_core::api::ChangeEvent>) -> Storage {
    Storage::builder(id)
        .root(dir.path())
        .bus(bus)
        .build()
        .unwrap()
}

/// Writes a unit the way another process would.
pub fn write_external(path: &Path, components: serde_json::Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let doc = serde_json::json!({"version": 1, "components": components});
    std::fs::write(path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}
