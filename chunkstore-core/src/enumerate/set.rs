use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::container::manifest::{ChunkInfo, Manifest};
use crate::domain::ChunkId;
use crate::error::{ChunkStoreError, Result};
use crate::paths::{self, DELTA_EXT};
use crate::store::ChunkStore;

/// Chunk id to the manifest that first lists it and its info there.
pub type ChunkIndex<'a> = HashMap<ChunkId, (&'a Manifest, &'a ChunkInfo)>;

/// A manifest together with the delta manifests filed next to it.
/// The base is searched first; deltas only extend it.
#[derive(Debug, Clone)]
pub struct ManifestSet {
    pub path: String,
    pub base: Manifest,
    /// (store path, manifest), sorted by path.
    pub deltas: Vec<(String, Manifest)>,
}

impl ManifestSet {
    pub fn load(store: &dyn ChunkStore, path: &str) -> Result<Self> {
        let base = Manifest::from_bytes(&store.read(path)?)?;
        let deltas = discover_deltas(store, &base)?;
        info!(
            manifest = path,
            version = base.version_string(),
            deltas = deltas.len(),
            "loaded manifest"
        );
        Ok(Self {
            path: path.to_string(),
            base,
            deltas,
        })
    }

    /// Base first, then deltas in path order.
    pub fn members(&self) -> impl Iterator<Item = &Manifest> {
        std::iter::once(&self.base).chain(self.deltas.iter().map(|(_, m)| m))
    }

    /// Referenced chunks in first-seen order, never repeating an id.
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        let mut seen = HashSet::new();
        self.members()
            .flat_map(|m| m.data_list())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// First manifest to list a chunk owns its info and data path.
    pub fn chunk_index(&self) -> ChunkIndex<'_> {
        let mut out = HashMap::new();
        for m in self.members() {
            for c in &m.chunks {
                out.entry(c.id).or_insert((m, c));
            }
        }
        out
    }

    /// Chunks used by files carrying any of `tags`, in any member manifest.
    pub fn chunks_for_tags(&self, tags: &BTreeSet<String>) -> HashSet<ChunkId> {
        self.members()
            .flat_map(|m| Manifest::chunks_for_files(m.tagged_files(tags)))
            .collect()
    }

    /// Store paths this set keeps alive: every chunk's data file plus the
    /// delta manifests themselves.
    pub fn referenced_paths(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self
            .members()
            .flat_map(|m| m.chunks.iter().map(move |c| paths::data_path(m, c)))
            .collect();
        out.extend(self.deltas.iter().map(|(p, _)| p.clone()));
        out
    }
}

/// Load every delta manifest filed under the base's identity. One that
/// fails to parse fails the whole load.
pub fn discover_deltas(store: &dyn ChunkStore, base: &Manifest) -> Result<Vec<(String, Manifest)>> {
    let dir = paths::deltas_dir(&base.identity());
    let suffix = format!(".{DELTA_EXT}");
    let mut out = Vec::new();
    for p in store.list_dir(&dir)? {
        if !p.ends_with(&suffix) {
            continue;
        }
        let delta = Manifest::from_bytes(&store.read(&p)?).map_err(|e| match e {
            ChunkStoreError::Corrupt { detail, .. } => ChunkStoreError::corrupt(p.clone(), detail),
            ChunkStoreError::Truncated {
                needed, available, ..
            } => ChunkStoreError::truncated(p.clone(), needed, available),
            other => other,
        })?;
        if delta.meta.app_name != base.meta.app_name
            || delta.meta.build_version != base.meta.build_version
        {
            return Err(ChunkStoreError::corrupt(
                p,
                format!(
                    "delta targets {} {}, not {} {}",
                    delta.meta.app_name,
                    delta.meta.build_version,
                    base.meta.app_name,
                    base.meta.build_version
                ),
            ));
        }
        debug!(path = %p, chunks = delta.chunks.len(), "found delta manifest");
        out.push((p, delta));
    }
    Ok(out)
}
