//! File-system seam for storage units.

mod local;

pub use local::LocalFileSystem;

use std::path::Path;

/// What the storage core needs from the persistent medium.
pub trait FileSystem: Send + Sync {
    /// Reads a unit. `Ok(None)` means the unit does not exist.
    fn read(&self, path: &Path) -> std::io::Result<Option<Vec<u8>>>;

    /// Replaces the unit so that readers see either the old or the new
    /// content, never a partial write.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}
