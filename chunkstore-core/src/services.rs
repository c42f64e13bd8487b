use std::path::{Path, PathBuf};

use crate::error::{ChunkStoreError, Result};
use crate::store::ChunkStore;
use crate::store::factory::{Backend, open_store};

/// Built once at process start and handed to every operation.
#[derive(Clone, Debug, Default)]
pub struct ChunkStoreServices {
    pub backend: Backend,
}

impl ChunkStoreServices {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn open_store(&self, root: &Path) -> Result<Box<dyn ChunkStore>> {
        open_store(&self.backend, root)
    }

    /// Open the store that holds `file` and return the file's store path.
    pub fn open_containing(&self, file: &Path) -> Result<(Box<dyn ChunkStore>, String)> {
        let name = file
            .file_name()
            .ok_or_else(|| {
                ChunkStoreError::Argument(format!("{} does not name a file", file.display()))
            })?
            .to_string_lossy()
            .into_owned();
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((self.open_store(&dir)?, name))
    }
}
