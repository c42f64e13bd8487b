use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use crate::error::{ChunkStoreError, Result};
use crate::store::{ChunkStore, ReadSeek, StagedFile};

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    modified: SystemTime,
}

type Files = BTreeMap<String, Entry>;

/// In-memory store. Modification times can be set by hand, which keeps
/// age-based tests deterministic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<Files>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Files> {
        // A panic while holding the lock leaves the map itself intact.
        self.files.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_modified(&self, path: &str, when: SystemTime) -> Result<()> {
        let mut files = self.lock();
        let e = files
            .get_mut(path)
            .ok_or_else(|| ChunkStoreError::NotFound(path.to_string()))?;
        e.modified = when;
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Entry> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| ChunkStoreError::NotFound(path.to_string()))
    }
}

impl ChunkStore for MemoryStore {
    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.get(path)?.data)
    }

    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
        Ok(Box::new(Cursor::new(self.get(path)?.data)))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.lock().insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn create(&self, path: &str) -> Result<Box<dyn StagedFile + '_>> {
        Ok(Box::new(MemoryStagedFile {
            store: self,
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock().contains_key(path))
    }

    fn size(&self, path: &str) -> Result<u64> {
        Ok(self.get(path)?.data.len() as u64)
    }

    fn modified(&self, path: &str) -> Result<SystemTime> {
        Ok(self.get(path)?.modified)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ChunkStoreError::NotFound(path.to_string()))
    }

    fn root_label(&self) -> String {
        "memory".to_string()
    }
}

/// Buffers writes and publishes them to the store on commit.
struct MemoryStagedFile<'a> {
    store: &'a MemoryStore,
    path: String,
    buf: Vec<u8>,
}

impl Write for MemoryStagedFile<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StagedFile for MemoryStagedFile<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        self.store.write(&self.path, &self.buf)
    }
}
