mod common;

use chunkstore_core::container::chunk::ChunkFile;
use chunkstore_core::container::package::{ChunkPackage, PackageWriter};
use chunkstore_core::domain::ChunkId;
use chunkstore_core::enumerate::{InputFormat, enumerate};
use chunkstore_core::paths;
use chunkstore_core::store::ChunkStore;
use chunkstore_core::store::memory::MemoryStore;
use chunkstore_core::{Manifest, enumerate_to_file};
use common::*;

const CHUNK: usize = 1024;

fn two_builds(store: &MemoryStore) -> (Manifest, Manifest) {
    let mut f = ChunkFactory::default();
    let a = build_manifest(
        store,
        &mut f,
        "1.0",
        &[BuildFile::new("data.bin", noise(1, 3 * CHUNK))],
        CHUNK,
    );
    let mut b_data = noise(1, 2 * CHUNK);
    b_data.extend(noise(2, CHUNK));
    let b = build_manifest(store, &mut f, "2.0", &[BuildFile::new("data.bin", b_data)], CHUNK);
    save_manifest(store, "TestApp_1.0.manifest", &a);
    save_manifest(store, "TestApp_2.0.manifest", &b);
    (a, b)
}

#[test]
fn listing_is_stable_across_runs() {
    init_tracing();
    let store = MemoryStore::new();
    let (_, b) = two_builds(&store);

    let first = enumerate_to_file(&store, "TestApp_2.0.manifest", &store, "one.txt", true).unwrap();
    enumerate_to_file(&store, "TestApp_2.0.manifest", &store, "two.txt", true).unwrap();
    assert_eq!(first.format, InputFormat::Manifest);
    assert_eq!(store.read("one.txt").unwrap(), store.read("two.txt").unwrap());

    let text = String::from_utf8(store.read("one.txt").unwrap()).unwrap();
    let want: String = b
        .chunks
        .iter()
        .map(|c| format!("{}\t{}\n", c.id, c.file_size))
        .collect();
    assert_eq!(text, want);
}

#[test]
fn delta_chunks_are_appended_once() {
    let store = MemoryStore::new();
    let (a, b) = two_builds(&store);

    // A delta for B that reuses one of A's chunks and repeats two of B's.
    let mut delta = b.clone();
    delta.chunks = vec![b.chunks[0].clone(), b.chunks[1].clone(), a.chunks[2].clone()];
    delta.files[0].parts = vec![
        b.files[0].parts[0],
        b.files[0].parts[1],
        a.files[0].parts[2],
    ];
    save_manifest(&store, &paths::delta_path(&a, &b), &delta);

    let e = enumerate(&store, "TestApp_2.0.manifest").unwrap();
    let ids: Vec<ChunkId> = e.records.iter().map(|r| r.id).collect();
    let mut want: Vec<ChunkId> = b.chunks.iter().map(|c| c.id).collect();
    want.push(a.chunks[2].id);
    assert_eq!(ids, want);

    // The older build knows nothing about B's deltas.
    let e = enumerate(&store, "TestApp_1.0.manifest").unwrap();
    assert_eq!(e.records.len(), a.chunks.len());
}

#[test]
fn unreadable_delta_fails_the_listing() {
    let store = MemoryStore::new();
    let (a, b) = two_builds(&store);
    store.write(&paths::delta_path(&a, &b), b"garbage").unwrap();
    assert!(enumerate(&store, "TestApp_2.0.manifest").is_err());
}

#[test]
fn delta_for_another_build_is_rejected() {
    let store = MemoryStore::new();
    let (a, b) = two_builds(&store);
    // Filed under B's identity but describing A.
    save_manifest(&store, &paths::delta_path(&a, &b), &a);
    assert!(enumerate(&store, "TestApp_2.0.manifest").is_err());
}

fn package_bytes(chunks: &[ChunkFile]) -> Vec<u8> {
    let layout: Vec<_> = chunks
        .iter()
        .map(|c| (c.header.id, c.payload.len() as u64))
        .collect();
    let mut buf = Vec::new();
    let mut w = PackageWriter::begin(&mut buf, ChunkPackage::plan(&layout)).unwrap();
    for c in chunks {
        w.append(c).unwrap();
    }
    w.finish().unwrap();
    buf
}

#[test]
fn zero_id_package_entry_is_reported_and_skipped() {
    let store = MemoryStore::new();
    let good = ChunkFile::encode(ChunkId([0x42; 16]), &noise(3, 200)).unwrap();
    let bad = ChunkFile::encode(ChunkId::ZERO, &noise(4, 200)).unwrap();
    let last = ChunkFile::encode(ChunkId([0x43; 16]), &noise(5, 200)).unwrap();
    store
        .write("mixed.pkg", &package_bytes(&[good.clone(), bad, last.clone()]))
        .unwrap();

    let e = enumerate(&store, "mixed.pkg").unwrap();
    assert_eq!(e.format, InputFormat::Package);
    let ids: Vec<_> = e.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![good.header.id, last.header.id]);
    assert_eq!(e.diagnostics.len(), 1);
    assert_eq!(e.records[0].rolling_hash, Some(good.header.rolling_hash));
}

#[test]
fn truncated_package_is_an_error() {
    let store = MemoryStore::new();
    let chunks = [
        ChunkFile::encode(ChunkId([0x51; 16]), &noise(6, 300)).unwrap(),
        ChunkFile::encode(ChunkId([0x52; 16]), &noise(7, 300)).unwrap(),
    ];
    let mut bytes = package_bytes(&chunks);
    bytes.truncate(bytes.len() - 10);
    store.write("short.pkg", &bytes).unwrap();
    assert!(enumerate(&store, "short.pkg").is_err());
}
