//! Delta optimisation between two builds.
//!
//! Data that build B adds on top of build A is scanned against the data A
//! holds that B no longer uses. Ranges found there are re-pointed at A's
//! chunks and the rest is repacked into new chunks. The result is filed as a
//! delta manifest for the A to B upgrade. Skipping this step never breaks a
//! patch, it only leaves it larger.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::container::manifest::{ChunkInfo, FileEntry, Manifest};
use crate::domain::{ChunkId, ChunkPart};
use crate::error::{ChunkStoreError, Result};
use crate::paths;
use crate::read::chunk::read_chunk_data;
use crate::store::ChunkStore;

pub mod builder;
pub mod scanner;

use builder::{NewChunkBuilder, PartMap, merge_adjacent};
use scanner::{Scanner, SourceIndex};

pub const MIN_SCAN_WINDOW: u32 = 8_000;
pub const MAX_SCAN_WINDOW: u32 = 131_072;
pub const DEFAULT_SCAN_WINDOW: u32 = 8_191;
pub const MIN_OUTPUT_CHUNK: u32 = 1_000_000;
pub const MAX_OUTPUT_CHUNK: u32 = 10_485_760;
pub const DEFAULT_OUTPUT_CHUNK: u32 = 1_048_576;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeltaOptions {
    pub scan_window_size: u32,
    pub output_chunk_size: u32,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            scan_window_size: DEFAULT_SCAN_WINDOW,
            output_chunk_size: DEFAULT_OUTPUT_CHUNK,
        }
    }
}

impl DeltaOptions {
    pub fn clamped(&self) -> Self {
        Self {
            scan_window_size: self.scan_window_size.clamp(MIN_SCAN_WINDOW, MAX_SCAN_WINDOW),
            output_chunk_size: self
                .output_chunk_size
                .clamp(MIN_OUTPUT_CHUNK, MAX_OUTPUT_CHUNK),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeltaTimings {
    pub setup_secs: f64,
    pub scan_secs: f64,
    pub write_secs: f64,
}

/// Written next to the delta as `DeltaMetas/{B}/{A}.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub source_build_version: String,
    pub destination_build_version: String,
    pub delta_path: Option<String>,
    pub reused_existing: bool,
    pub original_unknown_build_bytes: u64,
    pub final_unknown_build_bytes: u64,
    pub original_unknown_compressed_bytes: u64,
    pub final_unknown_compressed_bytes: u64,
    pub matched_bytes: u64,
    pub new_chunks: usize,
    pub timings: DeltaTimings,
}

/// Build (or reuse) the delta manifest that upgrades `a` to `b`, storing new
/// chunks, the delta and its statistics in `cloud`.
pub fn optimise(
    cloud: &dyn ChunkStore,
    a: &Manifest,
    b: &Manifest,
    opts: &DeltaOptions,
) -> Result<DeltaSummary> {
    let opts = opts.clamped();
    let delta_path = paths::delta_path(a, b);
    let meta_path = paths::delta_meta_path(a, b);
    let mut summary = DeltaSummary {
        source_build_version: a.version_string().to_string(),
        destination_build_version: b.version_string().to_string(),
        ..Default::default()
    };

    let a_ids: HashSet<ChunkId> = a.data_list().into_iter().collect();
    let b_ids: HashSet<ChunkId> = b.data_list().into_iter().collect();
    let unknown_b: HashSet<ChunkId> = b_ids.difference(&a_ids).copied().collect();
    summary.original_unknown_build_bytes = unknown_bytes(b, &a_ids, |c| c.window_size as u64);
    summary.original_unknown_compressed_bytes = unknown_bytes(b, &a_ids, |c| c.file_size);

    if cloud.exists(&delta_path)? {
        let existing = Manifest::from_bytes(&cloud.read(&delta_path)?)?;
        info!(path = %delta_path, "reusing existing delta manifest");
        summary.reused_existing = true;
        summary.delta_path = Some(delta_path);
        summary.final_unknown_build_bytes = unknown_bytes(&existing, &a_ids, |c| c.window_size as u64);
        summary.final_unknown_compressed_bytes = unknown_bytes(&existing, &a_ids, |c| c.file_size);
        write_summary(cloud, &meta_path, &summary)?;
        return Ok(summary);
    }

    let started = Instant::now();
    let mut cache = ChunkCache::new(cloud);

    // Source: A's data that B no longer references.
    let mut source = Vec::new();
    let mut source_map = PartMap::default();
    let mut seen = HashSet::new();
    for f in &a.files {
        for p in &f.parts {
            if b_ids.contains(&p.id) || !seen.insert(*p) {
                continue;
            }
            source.extend_from_slice(cache.part(a, p)?);
            source_map.push(*p);
        }
    }
    let window = opts.scan_window_size as usize;
    let index = SourceIndex::build(&source, window);
    summary.timings.setup_secs = started.elapsed().as_secs_f64();
    debug!(
        source_bytes = source.len(),
        blocks = index.block_count(),
        window,
        "indexed source data"
    );

    let scan_started = Instant::now();
    let mut new_chunks = NewChunkBuilder::new(opts.output_chunk_size as usize)?;
    let mut files = Vec::with_capacity(b.files.len());
    for f in &b.files {
        let mut parts = Vec::with_capacity(f.parts.len());
        let mut i = 0;
        while i < f.parts.len() {
            if !unknown_b.contains(&f.parts[i].id) {
                parts.push(f.parts[i]);
                i += 1;
                continue;
            }
            // A run of parts only B has: scan it as one contiguous segment.
            let mut segment = Vec::new();
            while i < f.parts.len() && unknown_b.contains(&f.parts[i].id) {
                segment.extend_from_slice(cache.part(b, &f.parts[i])?);
                i += 1;
            }
            let mut cursor = 0;
            for m in Scanner::new(&segment, &index) {
                parts.extend(new_chunks.push(&segment[cursor..m.dest])?);
                parts.extend(source_map.select(m.source as u64, m.len as u64));
                summary.matched_bytes += m.len as u64;
                cursor = m.dest + m.len;
            }
            parts.extend(new_chunks.push(&segment[cursor..])?);
        }
        files.push(FileEntry {
            path: f.path.clone(),
            tags: f.tags.clone(),
            parts: merge_adjacent(parts),
        });
    }
    let created = new_chunks.finish()?;
    summary.timings.scan_secs = scan_started.elapsed().as_secs_f64();

    if summary.matched_bytes == 0 {
        warn!(
            source = a.version_string(),
            destination = b.version_string(),
            "no reusable data found; delta not written"
        );
        write_summary(cloud, &meta_path, &summary)?;
        return Ok(summary);
    }

    let write_started = Instant::now();
    let mut new_infos = HashMap::with_capacity(created.len());
    for c in &created {
        let info = ChunkInfo {
            id: c.header.id,
            rolling_hash: c.header.rolling_hash,
            digest: c.header.digest,
            group: c.header.id.group(),
            window_size: c.header.uncompressed_size,
            file_size: crate::container::chunk::HEADER_LEN + c.payload.len() as u64,
        };
        cloud.write(&paths::chunk_path(&info), &c.to_bytes())?;
        new_infos.insert(info.id, info);
    }

    let delta = assemble(a, b, files, &new_infos)?;
    cloud.write(&delta_path, &delta.to_bytes()?)?;
    summary.timings.write_secs = write_started.elapsed().as_secs_f64();
    summary.new_chunks = created.len();
    summary.delta_path = Some(delta_path.clone());
    summary.final_unknown_build_bytes = unknown_bytes(&delta, &a_ids, |c| c.window_size as u64);
    summary.final_unknown_compressed_bytes = unknown_bytes(&delta, &a_ids, |c| c.file_size);
    write_summary(cloud, &meta_path, &summary)?;

    info!(
        delta = %delta_path,
        matched = summary.matched_bytes,
        new_chunks = summary.new_chunks,
        before = summary.original_unknown_compressed_bytes,
        after = summary.final_unknown_compressed_bytes,
        "delta optimisation complete"
    );
    Ok(summary)
}

/// B's metadata and fields with the rebuilt file list. Chunk info comes
/// from B first, then A, then the new chunks.
fn assemble(
    a: &Manifest,
    b: &Manifest,
    files: Vec<FileEntry>,
    new_infos: &HashMap<ChunkId, ChunkInfo>,
) -> Result<Manifest> {
    let (la, lb) = (a.chunk_lookup(), b.chunk_lookup());
    let mut chunks = Vec::new();
    let mut listed = HashSet::new();
    for id in files.iter().flat_map(|f| f.parts.iter().map(|p| p.id)) {
        if !listed.insert(id) {
            continue;
        }
        let info = lb
            .get(&id)
            .or_else(|| la.get(&id))
            .copied()
            .or_else(|| new_infos.get(&id))
            .ok_or_else(|| ChunkStoreError::NotFound(format!("chunk info for {id}")))?;
        chunks.push(info.clone());
    }
    let delta = Manifest {
        meta: b.meta.clone(),
        files,
        chunks,
        custom_fields: b.custom_fields.clone(),
    };
    delta.validate()?;
    Ok(delta)
}

fn unknown_bytes(m: &Manifest, known: &HashSet<ChunkId>, size: impl Fn(&ChunkInfo) -> u64) -> u64 {
    m.chunks
        .iter()
        .filter(|c| !known.contains(&c.id))
        .map(size)
        .sum()
}

fn write_summary(cloud: &dyn ChunkStore, path: &str, summary: &DeltaSummary) -> Result<()> {
    let json = serde_json::to_vec_pretty(summary).map_err(std::io::Error::other)?;
    cloud.write(path, &json)
}

/// Decoded chunk data, loaded on first use.
struct ChunkCache<'s> {
    cloud: &'s dyn ChunkStore,
    data: HashMap<ChunkId, Vec<u8>>,
}

impl<'s> ChunkCache<'s> {
    fn new(cloud: &'s dyn ChunkStore) -> Self {
        Self {
            cloud,
            data: HashMap::new(),
        }
    }

    fn part(&mut self, m: &Manifest, p: &ChunkPart) -> Result<&[u8]> {
        if !self.data.contains_key(&p.id) {
            let info = m
                .chunks
                .iter()
                .find(|c| c.id == p.id)
                .ok_or_else(|| ChunkStoreError::NotFound(format!("chunk info for {}", p.id)))?;
            let bytes = read_chunk_data(self.cloud, &paths::data_path(m, info), info)?;
            self.data.insert(p.id, bytes);
        }
        let data = &self.data[&p.id];
        let (start, end) = (p.offset as usize, p.offset as usize + p.size as usize);
        data.get(start..end).ok_or_else(|| {
            ChunkStoreError::corrupt(
                format!("chunk {}", p.id),
                format!("part {start}..{end} exceeds {} bytes", data.len()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_clamp_to_documented_ranges() {
        let o = DeltaOptions {
            scan_window_size: 10,
            output_chunk_size: u32::MAX,
        }
        .clamped();
        assert_eq!(o.scan_window_size, MIN_SCAN_WINDOW);
        assert_eq!(o.output_chunk_size, MAX_OUTPUT_CHUNK);
        let d = DeltaOptions::default().clamped();
        assert_eq!(d.scan_window_size, 8_191);
        assert_eq!(d.output_chunk_size, 1_048_576);
    }
}
