//! NVRAM images on disk: one `<id>.nvram` file per board in a directory.

use std::io;
use std::path::{Path, PathBuf};

use marquee_core::core::error::StorageError;
use marquee_core::core::storage::NvramStorage;

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `id`. Ids are board names, never paths.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.nvram")))
    }
}

impl NvramStorage for FileStorage {
    fn load(&mut self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(id)?;
        match std::fs::read(&path) {
            Ok(data) => {
                log::debug!("loaded {} bytes of nvram from {}", data.len(), path.display());
                Ok(Some(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(id)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, data)?;
        log::debug!("saved {} bytes of nvram to {}", data.len(), path.display());
        Ok(())
    }
}
