use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::FileSystem;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read(&self, path: &Path) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let parent = path.parent().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} has no parent directory", path),
            )
        })?;
        std::fs::create_dir_all(parent)?;

        // Temp file in the same directory so persist() is a same-filesystem rename.
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(bytes)?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
