use std::path::Path;

use crate::error::Result;
use crate::store::ChunkStore;
use crate::store::fs::FsStore;
use crate::store::memory::MemoryStore;

#[derive(Clone, Debug, Default)]
pub enum Backend {
    #[default]
    Fs,
    /// Every open returns a handle to the same in-memory store.
    Memory(MemoryHandle),
}

#[derive(Clone, Default)]
pub struct MemoryHandle(pub MemoryStore);

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MemoryHandle")
    }
}

pub fn open_store(backend: &Backend, root: &Path) -> Result<Box<dyn ChunkStore>> {
    match backend {
        Backend::Fs => Ok(Box::new(FsStore::new(root))),
        Backend::Memory(h) => Ok(Box::new(h.0.clone())),
    }
}
