mod common;

use chunkstore_core::paths;
use chunkstore_core::store::ChunkStore;
use chunkstore_core::store::memory::MemoryStore;
use chunkstore_core::{CompactifyOptions, compactify};
use common::*;

const CHUNK: usize = 4096;

/// Two builds sharing c2, plus an orphan c4 and a fresh c3.
/// A = {c1, c2}, B = {c2, c3}.
struct Cloud {
    store: MemoryStore,
    c1: String,
    c2: String,
    c3: String,
    c4: String,
}

fn cloud() -> Cloud {
    let store = MemoryStore::new();
    let mut f = ChunkFactory::default();
    let (d1, d2, d3, d4) = (noise(1, CHUNK), noise(2, CHUNK), noise(3, CHUNK), noise(4, CHUNK));

    let a = build_manifest(
        &store,
        &mut f,
        "1.0",
        &[BuildFile::new("game.bin", [d1.clone(), d2.clone()].concat())],
        CHUNK,
    );
    let b = build_manifest(
        &store,
        &mut f,
        "2.0",
        &[BuildFile::new("game.bin", [d2.clone(), d3.clone()].concat())],
        CHUNK,
    );
    let orphan = f.chunk(&store, &d4);
    save_manifest(&store, "TestApp_1.0.manifest", &a);
    save_manifest(&store, "TestApp_2.0.manifest", &b);

    let c1 = paths::chunk_path(&a.chunks[0]);
    let c2 = paths::chunk_path(&a.chunks[1]);
    let c3 = paths::chunk_path(&b.chunks[1]);
    let c4 = paths::chunk_path(&orphan);
    set_age_days(&store, &c1, 10);
    set_age_days(&store, &c2, 10);
    set_age_days(&store, &c3, 1);
    set_age_days(&store, &c4, 10);
    Cloud { store, c1, c2, c3, c4 }
}

#[test]
fn deletes_only_aged_unreferenced_chunks() {
    init_tracing();
    let c = cloud();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("deleted.log");

    let stats = compactify(
        &c.store,
        &CompactifyOptions {
            deleted_chunk_log: Some(log.clone()),
            ..CompactifyOptions::default()
        },
    )
    .unwrap();

    assert_eq!(stats.manifests, 2);
    assert_eq!(stats.deleted_paths, vec![c.c4.clone()]);
    assert_eq!(stats.deleted.files, 1);
    assert!(stats.diagnostics.is_empty());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), format!("{}\n", c.c4));

    for kept in [&c.c1, &c.c2, &c.c3] {
        assert!(c.store.exists(kept).unwrap(), "{kept} should survive");
    }
    assert!(!c.store.exists(&c.c4).unwrap());
    assert!(c.store.exists("TestApp_1.0.manifest").unwrap());
}

#[test]
fn preview_logs_the_same_paths_and_deletes_nothing() {
    let c = cloud();
    let dir = tempfile::tempdir().unwrap();
    let preview_log = dir.path().join("preview.log");
    let real_log = dir.path().join("real.log");
    let before = c.store.list_files().unwrap();

    let preview = compactify(
        &c.store,
        &CompactifyOptions {
            deleted_chunk_log: Some(preview_log.clone()),
            preview: true,
            ..CompactifyOptions::default()
        },
    )
    .unwrap();
    assert!(preview.preview);
    assert_eq!(c.store.list_files().unwrap(), before);

    let real = compactify(
        &c.store,
        &CompactifyOptions {
            deleted_chunk_log: Some(real_log.clone()),
            ..CompactifyOptions::default()
        },
    )
    .unwrap();
    assert_eq!(preview.deleted_paths, real.deleted_paths);
    assert_eq!(
        std::fs::read(&preview_log).unwrap(),
        std::fs::read(&real_log).unwrap()
    );
}

#[test]
fn deleting_a_manifest_releases_its_chunks() {
    let c = cloud();
    c.store.delete("TestApp_1.0.manifest").unwrap();

    let stats = compactify(&c.store, &CompactifyOptions::default()).unwrap();
    let mut deleted = stats.deleted_paths.clone();
    deleted.sort();
    let mut want = vec![c.c1.clone(), c.c4.clone()];
    want.sort();
    assert_eq!(deleted, want);
    assert!(c.store.exists(&c.c2).unwrap());
}

#[test]
fn zero_threshold_still_spares_referenced_chunks() {
    let c = cloud();
    let stats = compactify(&c.store, &CompactifyOptions::with_threshold_days(0.0).unwrap()).unwrap();
    assert_eq!(stats.deleted_paths, vec![c.c4.clone()]);
    assert_eq!(stats.skipped_young.files, 0);
}

#[test]
fn filesystem_store_without_manifests() {
    let dir = tempfile::tempdir().unwrap();
    let store = chunkstore_core::store::fs::FsStore::new(dir.path());
    store.write("Chunks/01/0000000000000001_AA.chunk", b"x").unwrap();
    store.write("notes.txt", b"keep me").unwrap();

    let stats = compactify(&store, &CompactifyOptions::with_threshold_days(0.0).unwrap()).unwrap();
    assert_eq!(stats.manifests, 0);
    assert_eq!(stats.deleted.files, 1);
    assert_eq!(stats.unknown.files, 1);
    assert_eq!(store.list_files().unwrap(), vec!["notes.txt"]);
}

#[test]
fn unreadable_manifest_aborts_before_deleting() {
    let c = cloud();
    c.store.write("Broken.manifest", b"not a manifest").unwrap();
    assert!(compactify(&c.store, &CompactifyOptions::default()).is_err());
    assert!(c.store.exists(&c.c4).unwrap());
}
