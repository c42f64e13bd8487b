//! Where things live inside a chunk store.

use crate::container::manifest::{ChunkInfo, Manifest};
use crate::domain::ChunkId;

pub const MANIFEST_EXT: &str = "manifest";
pub const CHUNK_EXT: &str = "chunk";
pub const DELTA_EXT: &str = "delta";
pub const FILE_DATA_EXT: &str = "file";

pub const CHUNKS_DIR: &str = "Chunks";
pub const FILES_DIR: &str = "Files";
pub const DELTAS_DIR: &str = "Deltas";
pub const DELTA_METAS_DIR: &str = "DeltaMetas";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    Manifest,
    /// Chunk, delta or legacy whole-file data.
    Data,
    Unknown,
}

impl FileKind {
    pub fn classify(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some(MANIFEST_EXT) => FileKind::Manifest,
            Some(CHUNK_EXT | DELTA_EXT | FILE_DATA_EXT) => FileKind::Data,
            _ => FileKind::Unknown,
        }
    }
}

pub fn chunk_path(info: &ChunkInfo) -> String {
    format!(
        "{CHUNKS_DIR}/{:02}/{:016X}_{}.{CHUNK_EXT}",
        info.group, info.rolling_hash, info.id
    )
}

pub fn file_data_path(id: &ChunkId, group: u8) -> String {
    format!("{FILES_DIR}/{group:02}/{id}.{FILE_DATA_EXT}")
}

/// Store path of one chunk's data for the layout the manifest uses.
pub fn data_path(manifest: &Manifest, info: &ChunkInfo) -> String {
    if manifest.meta.is_file_data {
        file_data_path(&info.id, info.group)
    } else {
        chunk_path(info)
    }
}

pub fn deltas_dir(target_identity: &str) -> String {
    format!("{DELTAS_DIR}/{target_identity}")
}

/// Delta manifest that upgrades `source` to `target`.
pub fn delta_path(source: &Manifest, target: &Manifest) -> String {
    format!(
        "{}/{}.{DELTA_EXT}",
        deltas_dir(&target.identity()),
        source.identity()
    )
}

pub fn delta_meta_path(source: &Manifest, target: &Manifest) -> String {
    format!(
        "{DELTA_METAS_DIR}/{}/{}.json",
        target.identity(),
        source.identity()
    )
}
