//! Persistent storage boundary for NVRAM images.

use std::collections::HashMap;

use crate::core::error::StorageError;

/// Byte-blob load/save keyed by a per-machine identifier.
pub trait NvramStorage {
    /// Returns `Ok(None)` when nothing has been saved for `id` yet.
    fn load(&mut self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn save(&mut self, id: &str, data: &[u8]) -> Result<(), StorageError>;
}

/// In-memory storage (tests, or hosts that persist elsewhere).
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.blobs.get(id).map(Vec::as_slice)
    }
}

impl NvramStorage for MemoryStorage {
    fn load(&mut self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(id).cloned())
    }

    fn save(&mut self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        if id.is_empty() {
            return Err(StorageError::InvalidKey(id.to_string()));
        }
        self.blobs.insert(id.to_string(), data.to_vec());
        Ok(())
    }
}
