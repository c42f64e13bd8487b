//! Structural and size comparison of two manifests.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::container::manifest::{FileEntry, Manifest};
use crate::domain::ChunkId;
use crate::error::{ChunkStoreError, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Installed tags for A. Empty means every tag A uses.
    pub tags_a: BTreeSet<String>,
    pub tags_b: BTreeSet<String>,
    /// Extra size breakdowns, each a subset of B's tags.
    pub compare_tag_sets: Vec<BTreeSet<String>>,
}

impl DiffOptions {
    /// Checked before any manifest is read.
    pub fn validate(&self) -> Result<()> {
        if self.tags_b.is_empty() {
            return Ok(());
        }
        check_subsets(&self.compare_tag_sets, &self.tags_b)
    }
}

fn check_subsets(sets: &[BTreeSet<String>], filter: &BTreeSet<String>) -> Result<()> {
    for set in sets {
        if !set.is_subset(filter) {
            let extra: Vec<_> = set.difference(filter).cloned().collect();
            return Err(ChunkStoreError::Config(format!(
                "compare tag set {set:?} is not a subset of B's install tags (extra: {extra:?})"
            )));
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub app_name: String,
    pub build_version: String,
    pub install_tags: BTreeSet<String>,
    pub build_size: u64,
    pub download_size: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TagSetSizes {
    pub tags: BTreeSet<String>,
    pub download_size_bytes: u64,
    pub install_size_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiffReport {
    pub manifest_a: ManifestSummary,
    pub manifest_b: ManifestSummary,
    pub new_paths: Vec<String>,
    pub removed_paths: Vec<String>,
    pub changed_paths: Vec<String>,
    pub unchanged_paths: Vec<String>,
    pub new_chunks: Vec<ChunkId>,
    pub removed_chunks: Vec<ChunkId>,
    pub download_size_bytes: u64,
    pub install_size_a: u64,
    pub install_size_b: u64,
    pub install_size_delta: i64,
    pub compare_tag_sets: Vec<TagSetSizes>,
}

impl DiffReport {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| std::io::Error::other(e).into())
    }
}

fn effective_tags(m: &Manifest, tags: &BTreeSet<String>) -> BTreeSet<String> {
    if tags.is_empty() {
        m.file_tags()
    } else {
        tags.clone()
    }
}

fn install_size<'a>(files: impl IntoIterator<Item = &'a FileEntry>) -> u64 {
    files.into_iter().map(FileEntry::size).sum()
}

/// Bytes B needs for `files` that A's installed files do not already hold.
fn download_size(
    a_installed: &BTreeMap<&str, &FileEntry>,
    b: &Manifest,
    files: &[&FileEntry],
) -> u64 {
    let outdated = files
        .iter()
        .filter(|f| a_installed.get(f.path.as_str()).is_none_or(|af| af.parts != f.parts))
        .copied();
    let mut needed = Manifest::chunks_for_files(outdated);
    let have = Manifest::chunks_for_files(a_installed.values().copied());
    needed.retain(|id| !have.contains(id));
    b.data_size(&needed)
}

pub fn diff_manifests(a: &Manifest, b: &Manifest, opts: &DiffOptions) -> Result<DiffReport> {
    opts.validate()?;
    let tags_a = effective_tags(a, &opts.tags_a);
    let tags_b = effective_tags(b, &opts.tags_b);
    check_subsets(&opts.compare_tag_sets, &tags_b)?;

    let a_files: BTreeMap<&str, &FileEntry> = a
        .tagged_files(&tags_a)
        .into_iter()
        .map(|f| (f.path.as_str(), f))
        .collect();
    let b_list = b.tagged_files(&tags_b);
    let b_files: BTreeMap<&str, &FileEntry> = b_list.iter().map(|f| (f.path.as_str(), *f)).collect();

    let mut report = DiffReport {
        manifest_a: summary(a, tags_a),
        manifest_b: summary(b, tags_b),
        ..Default::default()
    };
    for (path, bf) in &b_files {
        match a_files.get(path) {
            None => report.new_paths.push(path.to_string()),
            Some(af) if af.parts != bf.parts => report.changed_paths.push(path.to_string()),
            Some(_) => report.unchanged_paths.push(path.to_string()),
        }
    }
    report.removed_paths = a_files
        .keys()
        .filter(|p| !b_files.contains_key(*p))
        .map(|p| p.to_string())
        .collect();

    let a_chunks: HashSet<ChunkId> = Manifest::chunks_for_files(a_files.values().copied());
    let b_chunks: HashSet<ChunkId> = Manifest::chunks_for_files(b_files.values().copied());
    report.new_chunks = sorted(b_chunks.difference(&a_chunks));
    report.removed_chunks = sorted(a_chunks.difference(&b_chunks));

    report.download_size_bytes = download_size(&a_files, b, &b_list);
    report.install_size_a = install_size(a_files.values().copied());
    report.install_size_b = install_size(b_list.iter().copied());
    report.install_size_delta = report.install_size_b as i64 - report.install_size_a as i64;

    for set in &opts.compare_tag_sets {
        let files = b.tagged_files(set);
        report.compare_tag_sets.push(TagSetSizes {
            tags: set.clone(),
            download_size_bytes: download_size(&a_files, b, &files),
            install_size_bytes: install_size(files.iter().copied()),
        });
    }

    info!(
        a = a.version_string(),
        b = b.version_string(),
        new = report.new_paths.len(),
        removed = report.removed_paths.len(),
        changed = report.changed_paths.len(),
        download = report.download_size_bytes,
        "manifest diff complete"
    );
    Ok(report)
}

fn summary(m: &Manifest, install_tags: BTreeSet<String>) -> ManifestSummary {
    ManifestSummary {
        app_name: m.meta.app_name.clone(),
        build_version: m.meta.build_version.clone(),
        install_tags,
        build_size: m.build_size(),
        download_size: m.download_size(),
    }
}

fn sorted<'a>(ids: impl Iterator<Item = &'a ChunkId>) -> Vec<ChunkId> {
    let mut v: Vec<ChunkId> = ids.copied().collect();
    v.sort();
    v
}
