// chunkstore_core/src/store/mod.rs
use std::io::{Read, Seek, Write};
use std::time::SystemTime;

use crate::error::Result;

pub mod factory;
pub mod fs;
pub mod memory;

pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// A file being written that becomes visible at its path only once
/// committed. Dropping it uncommitted discards everything written.
pub trait StagedFile: Write + Send {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// A directory or bucket of chunk, delta and manifest files addressed by
/// store-relative `/`-separated paths.
pub trait ChunkStore: Send + Sync {
    /// Every file below the root, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Files below directory `dir`, sorted. A missing directory is empty.
    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|p| p.starts_with(&prefix))
            .collect())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek + '_>>;

    /// Replace `path` with `data`. Readers never observe a partial file.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Streaming writer for outputs too large to buffer. Nothing appears at
    /// `path` until the returned file is committed.
    fn create(&self, path: &str) -> Result<Box<dyn StagedFile + '_>>;

    fn exists(&self, path: &str) -> Result<bool>;

    fn size(&self, path: &str) -> Result<u64>;

    fn modified(&self, path: &str) -> Result<SystemTime>;

    fn delete(&self, path: &str) -> Result<()>;

    /// Human readable location, for logs.
    fn root_label(&self) -> String;
}

/// Directory part of a store path, `""` at the root.
pub fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
