//! Garbage collection of unreferenced, aged data files.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::domain::Diagnostic;
use crate::enumerate::ManifestSet;
use crate::error::{ChunkStoreError, Result};
use crate::paths::FileKind;
use crate::store::ChunkStore;

pub const DEFAULT_DATA_AGE_THRESHOLD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactifyOptions {
    /// Unreferenced files younger than this are kept.
    pub data_age_threshold: Duration,
    /// Local file receiving one deleted (or would-be deleted) path per line.
    pub deleted_chunk_log: Option<PathBuf>,
    /// Log what would be deleted without touching the store.
    pub preview: bool,
}

impl Default for CompactifyOptions {
    fn default() -> Self {
        Self {
            data_age_threshold: DEFAULT_DATA_AGE_THRESHOLD,
            deleted_chunk_log: None,
            preview: false,
        }
    }
}

impl CompactifyOptions {
    /// Threshold given in (possibly fractional) days. Negative, non-finite
    /// and unrepresentably large values are argument errors.
    pub fn with_threshold_days(days: f64) -> Result<Self> {
        let bad = || {
            ChunkStoreError::Argument(format!(
                "dataAgeThreshold must be a non-negative number of days, got {days}"
            ))
        };
        if !days.is_finite() || days < 0.0 {
            return Err(bad());
        }
        let data_age_threshold = Duration::try_from_secs_f64(days * 86_400.0).map_err(|_| bad())?;
        Ok(Self {
            data_age_threshold,
            ..Self::default()
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub files: u64,
    pub bytes: u64,
}

impl Tally {
    fn add(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactifyStats {
    pub manifests: u64,
    pub processed: Tally,
    pub referenced: Tally,
    pub skipped_young: Tally,
    pub unknown: Tally,
    pub deleted: Tally,
    pub deleted_paths: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Unix seconds when the run began.
    pub started_at: i64,
    pub preview: bool,
}

/// Delete data files that no manifest in the store references and that
/// are older than the configured threshold.
///
/// With no manifests in the store nothing is protected, and every aged data
/// file is eligible.
pub fn compactify(store: &dyn ChunkStore, opts: &CompactifyOptions) -> Result<CompactifyStats> {
    // The audit trail must exist before anything is deleted.
    let mut log = match &opts.deleted_chunk_log {
        Some(p) => Some(BufWriter::new(File::create(p)?)),
        None => None,
    };

    let mut stats = CompactifyStats {
        started_at: OffsetDateTime::now_utc().unix_timestamp(),
        preview: opts.preview,
        ..Default::default()
    };

    let (manifests, others): (Vec<String>, Vec<String>) = store
        .list_files()?
        .into_iter()
        .partition(|p| FileKind::classify(p) == FileKind::Manifest);
    stats.manifests = manifests.len() as u64;

    if manifests.is_empty() {
        warn!(
            store = %store.root_label(),
            "no manifests found; all aged data files are eligible for deletion"
        );
    }

    let mut referenced = BTreeSet::new();
    for m in &manifests {
        let set = ManifestSet::load(store, m).inspect_err(|e| {
            if e.is_parse_error() {
                error!(manifest = %m, error = %e, "unreadable manifest; nothing will be deleted");
            }
        })?;
        referenced.extend(set.referenced_paths());
    }
    info!(
        manifests = manifests.len(),
        referenced = referenced.len(),
        candidates = others.len(),
        "built reference set"
    );

    let now = SystemTime::now();
    for path in others {
        let (size, modified) = match store.size(&path).and_then(|s| Ok((s, store.modified(&path)?))) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path, error = %e, "cannot stat file; skipping");
                stats.diagnostics.push(Diagnostic::new(&path, e.to_string()));
                continue;
            }
        };
        stats.processed.add(size);

        if referenced.contains(&path) {
            stats.referenced.add(size);
            continue;
        }
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < opts.data_age_threshold {
            stats.skipped_young.add(size);
            continue;
        }
        if FileKind::classify(&path) != FileKind::Data {
            stats.unknown.add(size);
            continue;
        }

        if opts.preview {
            info!(path = %path, bytes = size, "would delete");
        } else {
            store.delete(&path)?;
            info!(path = %path, bytes = size, "deleted");
        }
        if let Some(w) = log.as_mut() {
            writeln!(w, "{path}")?;
        }
        stats.deleted.add(size);
        stats.deleted_paths.push(path);
    }

    if let Some(mut w) = log {
        w.flush()?;
    }
    info!(
        processed = stats.processed.files,
        young = stats.skipped_young.files,
        unknown = stats.unknown.files,
        deleted = stats.deleted.files,
        deleted_bytes = stats.deleted.bytes,
        preview = opts.preview,
        "compactify complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    const DAY: Duration = Duration::from_secs(86_400);

    fn aged(store: &MemoryStore, path: &str, days: u64) {
        store.write(path, b"data").unwrap();
        store
            .set_modified(path, SystemTime::now() - DAY * days as u32)
            .unwrap();
    }

    #[test]
    fn no_manifests_still_collects_aged_data() {
        let s = MemoryStore::new();
        aged(&s, "Chunks/00/A.chunk", 10);
        aged(&s, "Chunks/00/B.chunk", 1);
        let stats = compactify(&s, &CompactifyOptions::default()).unwrap();
        assert_eq!(stats.manifests, 0);
        assert_eq!(stats.deleted_paths, vec!["Chunks/00/A.chunk"]);
        assert_eq!(s.list_files().unwrap(), vec!["Chunks/00/B.chunk"]);
    }

    #[test]
    fn unknown_suffixes_are_left_alone() {
        let s = MemoryStore::new();
        aged(&s, "notes.txt", 30);
        aged(&s, "DeltaMetas/a/b.json", 30);
        let stats = compactify(&s, &CompactifyOptions::default()).unwrap();
        assert_eq!(stats.unknown.files, 2);
        assert_eq!(stats.unknown.bytes, 8);
        assert_eq!(stats.deleted.files, 0);
        assert_eq!(s.list_files().unwrap().len(), 2);
    }

    #[test]
    fn unwritable_log_fails_before_scanning() {
        let s = MemoryStore::new();
        aged(&s, "Chunks/00/A.chunk", 10);
        let opts = CompactifyOptions {
            deleted_chunk_log: Some(PathBuf::from("/nonexistent-dir/for/sure/log.txt")),
            ..Default::default()
        };
        assert!(compactify(&s, &opts).is_err());
        assert!(s.exists("Chunks/00/A.chunk").unwrap());
    }

    #[test]
    fn threshold_in_days() {
        let o = CompactifyOptions::with_threshold_days(1.5).unwrap();
        assert_eq!(o.data_age_threshold, Duration::from_secs(129_600));
        assert_eq!(
            CompactifyOptions::with_threshold_days(0.0).unwrap().data_age_threshold,
            Duration::ZERO
        );
    }

    #[test]
    fn out_of_range_threshold_is_an_argument_error() {
        for days in [-1.0, 1e20, f64::INFINITY, f64::NAN, f64::MAX] {
            assert!(
                matches!(
                    CompactifyOptions::with_threshold_days(days),
                    Err(ChunkStoreError::Argument(_))
                ),
                "{days}"
            );
        }
    }
}
