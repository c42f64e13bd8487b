#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, SystemTime};

use chunkstore_core::container::chunk::{ChunkFile, HEADER_LEN};
use chunkstore_core::container::manifest::{ChunkInfo, FileEntry, Manifest};
use chunkstore_core::domain::{ChunkId, ChunkPart, Digest};
use chunkstore_core::paths;
use chunkstore_core::read::chunk::read_chunk_data;
use chunkstore_core::store::ChunkStore;
use chunkstore_core::store::memory::MemoryStore;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Deterministic incompressible bytes.
pub fn noise(seed: u32, n: usize) -> Vec<u8> {
    let mut x = seed ^ 0x9E37_79B9;
    (0..n)
        .map(|_| {
            x = x.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (x >> 24) as u8
        })
        .collect()
}

pub fn tags(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Writes chunks into a store, reusing an existing chunk when the same
/// bytes were stored before.
#[derive(Default)]
pub struct ChunkFactory {
    by_digest: HashMap<Digest, ChunkInfo>,
}

impl ChunkFactory {
    pub fn chunk(&mut self, store: &dyn ChunkStore, data: &[u8]) -> ChunkInfo {
        let digest = Digest::of(data);
        if let Some(info) = self.by_digest.get(&digest) {
            return info.clone();
        }
        let c = ChunkFile::encode(ChunkId::new_random().unwrap(), data).unwrap();
        let info = ChunkInfo {
            id: c.header.id,
            rolling_hash: c.header.rolling_hash,
            digest: c.header.digest,
            group: c.header.id.group(),
            window_size: c.header.uncompressed_size,
            file_size: HEADER_LEN + c.payload.len() as u64,
        };
        store.write(&paths::chunk_path(&info), &c.to_bytes()).unwrap();
        self.by_digest.insert(digest, info.clone());
        info
    }
}

pub struct BuildFile<'a> {
    pub path: &'a str,
    pub tags: &'a [&'a str],
    pub data: Vec<u8>,
}

impl<'a> BuildFile<'a> {
    pub fn new(path: &'a str, data: Vec<u8>) -> Self {
        Self {
            path,
            tags: &[],
            data,
        }
    }

    pub fn tagged(path: &'a str, tags: &'a [&'a str], data: Vec<u8>) -> Self {
        Self { path, tags, data }
    }
}

/// Split each file into fixed-size chunks and describe the build.
pub fn build_manifest(
    store: &dyn ChunkStore,
    factory: &mut ChunkFactory,
    version: &str,
    files: &[BuildFile<'_>],
    chunk_size: usize,
) -> Manifest {
    let mut m = Manifest::new("TestApp", version);
    let mut listed = HashSet::new();
    for f in files {
        let mut parts = Vec::new();
        for piece in f.data.chunks(chunk_size) {
            let info = factory.chunk(store, piece);
            parts.push(ChunkPart {
                id: info.id,
                offset: 0,
                size: piece.len() as u32,
            });
            if listed.insert(info.id) {
                m.chunks.push(info);
            }
        }
        m.files.push(FileEntry {
            path: f.path.to_string(),
            tags: tags(f.tags),
            parts,
        });
    }
    m
}

pub fn save_manifest(store: &dyn ChunkStore, path: &str, m: &Manifest) {
    store.write(path, &m.to_bytes().unwrap()).unwrap();
}

/// Rebuild one file's bytes from the chunks in `store`.
pub fn reconstruct(store: &dyn ChunkStore, m: &Manifest, path: &str) -> Vec<u8> {
    let lookup = m.chunk_lookup();
    let file = m.file(path).unwrap();
    let mut out = Vec::new();
    for p in &file.parts {
        let info = lookup[&p.id];
        let data = read_chunk_data(store, &paths::data_path(m, info), info).unwrap();
        out.extend_from_slice(&data[p.offset as usize..(p.offset + p.size) as usize]);
    }
    out
}

pub fn set_age_days(store: &MemoryStore, path: &str, days: u64) {
    let when = SystemTime::now() - Duration::from_secs(days * 86_400);
    store.set_modified(path, when).unwrap();
}
