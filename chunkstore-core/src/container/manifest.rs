use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::container::manifest_header::{self, ManifestHeader};
use crate::domain::{ChunkId, ChunkPart, Digest};
use crate::error::{ChunkStoreError, Result};

/// Everything the store needs to know about one chunk a manifest references.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub rolling_hash: u64,
    pub digest: Digest,
    pub group: u8,
    /// Uncompressed size of the chunk data.
    pub window_size: u32,
    /// Size of the chunk file as stored (what a download costs).
    pub file_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub parts: Vec<ChunkPart>,
}

impl FileEntry {
    pub fn size(&self) -> u64 {
        self.parts.iter().map(|p| p.size as u64).sum()
    }

    /// Untagged files belong to the empty tag.
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        if self.tags.is_empty() {
            tags.contains("")
        } else {
            self.tags.iter().any(|t| tags.contains(t))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum CustomValue {
    String(String),
    Integer(i64),
    Double(f64),
    Bool(bool),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestMeta {
    pub app_name: String,
    pub build_version: String,
    #[serde(default)]
    pub launch_exe: String,
    #[serde(default)]
    pub launch_command: String,
    /// Legacy layout where every file is one whole-file data blob.
    #[serde(default)]
    pub is_file_data: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub meta: ManifestMeta,
    pub files: Vec<FileEntry>,
    pub chunks: Vec<ChunkInfo>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, CustomValue>,
}

impl Manifest {
    pub fn new(app_name: &str, build_version: &str) -> Self {
        Self {
            meta: ManifestMeta {
                app_name: app_name.to_string(),
                build_version: build_version.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn version_string(&self) -> &str {
        &self.meta.build_version
    }

    /// Short stable key used to file delta manifests next to this build.
    pub fn identity(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.meta.app_name.as_bytes());
        h.update(b"\n");
        h.update(self.meta.build_version.as_bytes());
        hex::encode(&h.finalize().as_bytes()[..8])
    }

    /// Every chunk this manifest references, in chunk-list order.
    pub fn data_list(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub fn chunk_lookup(&self) -> HashMap<ChunkId, &ChunkInfo> {
        self.chunks.iter().map(|c| (c.id, c)).collect()
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// All tags used by files, with `""` standing for untagged files.
    pub fn file_tags(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for f in &self.files {
            if f.tags.is_empty() {
                out.insert(String::new());
            } else {
                out.extend(f.tags.iter().cloned());
            }
        }
        out
    }

    pub fn tagged_files<'a>(&'a self, tags: &BTreeSet<String>) -> Vec<&'a FileEntry> {
        self.files.iter().filter(|f| f.has_any_tag(tags)).collect()
    }

    pub fn chunks_for_files<'a>(files: impl IntoIterator<Item = &'a FileEntry>) -> HashSet<ChunkId> {
        files
            .into_iter()
            .flat_map(|f| f.parts.iter().map(|p| p.id))
            .collect()
    }

    pub fn build_size(&self) -> u64 {
        self.files.iter().map(FileEntry::size).sum()
    }

    /// Sum of stored sizes for the given chunks; unknown ids count as zero.
    pub fn data_size<'a>(&self, ids: impl IntoIterator<Item = &'a ChunkId>) -> u64 {
        let lookup = self.chunk_lookup();
        ids.into_iter()
            .filter_map(|id| lookup.get(id).map(|c| c.file_size))
            .sum()
    }

    pub fn download_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.file_size).sum()
    }

    /// Every part must name a chunk in the chunk list, and the list holds no duplicates.
    pub fn validate(&self) -> Result<()> {
        let mut known = HashSet::with_capacity(self.chunks.len());
        for c in &self.chunks {
            if !c.id.is_valid() {
                return Err(ChunkStoreError::corrupt("manifest", "zero chunk id in chunk list"));
            }
            if !known.insert(c.id) {
                return Err(ChunkStoreError::corrupt(
                    "manifest",
                    format!("chunk {} listed twice", c.id),
                ));
            }
        }
        for f in &self.files {
            if let Some(p) = f.parts.iter().find(|p| !known.contains(&p.id)) {
                return Err(ChunkStoreError::corrupt(
                    "manifest",
                    format!("{} references unlisted chunk {}", f.path, p.id),
                ));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        ciborium::ser::into_writer(self, &mut body)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let mut out = Vec::with_capacity(manifest_header::HEADER_LEN as usize + body.len());
        ManifestHeader::for_body(&body).write_to(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = ManifestHeader::read_from(bytes)?;
        let body = header.body(bytes)?;
        let manifest: Manifest = ciborium::de::from_reader(body)
            .map_err(|e| ChunkStoreError::corrupt("manifest body", e))?;
        manifest.validate()?;
        Ok(manifest)
    }
}
