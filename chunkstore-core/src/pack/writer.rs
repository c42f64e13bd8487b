use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::container::package::{ChunkPackage, PackageWriter};
use crate::enumerate::{ChunkIndex, ManifestSet};
use crate::error::{ChunkStoreError, Result};
use crate::pack::plan::{PackageOptions, PassPlan, part_file_name, plan_package};
use crate::read::chunk::load_chunk;
use crate::store::{ChunkStore, StagedFile};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackageFileSummary {
    pub path: String,
    pub tag_set: Option<usize>,
    pub part: usize,
    pub chunk_count: usize,
    pub payload_bytes: u64,
    pub file_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TagSetSummary {
    pub index: usize,
    pub tags: BTreeSet<String>,
    pub files: usize,
    pub chunk_count: usize,
    pub payload_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackageSummary {
    pub required_chunks: usize,
    pub excluded_by_previous: usize,
    pub files: Vec<PackageFileSummary>,
    pub tag_sets: Vec<TagSetSummary>,
    pub total_chunks: usize,
    pub total_payload_bytes: u64,
    pub total_file_bytes: u64,
}

impl PackageSummary {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| std::io::Error::other(e).into())
    }
}

/// Write the chunk packages needed for `target`, reading chunk data from
/// `cloud` and writing files named after `output` into `out`.
///
/// Any chunk that cannot be read or fails verification aborts the run, and
/// an aborted run leaves no package files in `out`.
pub fn package_chunks(
    target: &ManifestSet,
    previous: Option<&ManifestSet>,
    cloud: &dyn ChunkStore,
    out: &dyn ChunkStore,
    output: &str,
    opts: &PackageOptions,
) -> Result<PackageSummary> {
    let plan = plan_package(target, previous, cloud, opts)?;
    let index = target.chunk_index();

    let mut summary = PackageSummary {
        required_chunks: plan.required,
        excluded_by_previous: plan.excluded_by_previous,
        ..Default::default()
    };
    let mut staged = Vec::new();
    for pass in &plan.passes {
        let before = summary.files.len();
        write_pass(pass, &index, cloud, out, output, &mut summary.files, &mut staged)?;
        if let Some(k) = pass.tag_set {
            let files = &summary.files[before..];
            summary.tag_sets.push(TagSetSummary {
                index: k,
                tags: pass.tags.clone(),
                files: files.len(),
                chunk_count: files.iter().map(|f| f.chunk_count).sum(),
                payload_bytes: files.iter().map(|f| f.payload_bytes).sum(),
            });
        }
    }
    commit_all(out, staged)?;
    summary.total_chunks = summary.files.iter().map(|f| f.chunk_count).sum();
    summary.total_payload_bytes = summary.files.iter().map(|f| f.payload_bytes).sum();
    summary.total_file_bytes = summary.files.iter().map(|f| f.file_bytes).sum();
    info!(
        files = summary.files.len(),
        chunks = summary.total_chunks,
        bytes = summary.total_file_bytes,
        "packaging complete"
    );
    Ok(summary)
}

type Staged<'a> = (String, Box<dyn StagedFile + 'a>);

/// Publish every staged part. If one fails, the parts already published
/// are removed again.
fn commit_all(out: &dyn ChunkStore, staged: Vec<Staged<'_>>) -> Result<()> {
    let mut done: Vec<String> = Vec::with_capacity(staged.len());
    for (path, file) in staged {
        if let Err(e) = file.commit() {
            for p in &done {
                if let Err(de) = out.delete(p) {
                    warn!(path = %p, error = %de, "could not remove package after failed run");
                }
            }
            return Err(e);
        }
        done.push(path);
    }
    Ok(())
}

fn write_pass<'a>(
    pass: &PassPlan,
    index: &ChunkIndex<'_>,
    cloud: &dyn ChunkStore,
    out: &'a dyn ChunkStore,
    output: &str,
    files: &mut Vec<PackageFileSummary>,
    staged: &mut Vec<Staged<'a>>,
) -> Result<()> {
    let part_count = pass.parts.len();
    for (i, range) in pass.parts.iter().enumerate() {
        let chunks = &pass.chunks[range.clone()];
        let layout: Vec<_> = chunks.iter().map(|c| (c.id, c.payload_size)).collect();
        let package = ChunkPackage::plan(&layout);
        let path = part_file_name(output, pass.tag_set, i + 1, part_count);

        let sink = out.create(&path)?;
        let mut w = PackageWriter::begin(sink, package)?;
        for c in chunks {
            let (_, info) = index
                .get(&c.id)
                .ok_or_else(|| ChunkStoreError::NotFound(format!("chunk info for {}", c.id)))?;
            let chunk = load_chunk(cloud, &c.path, info)?;
            chunk.decode_verified()?;
            w.append(&chunk)?;
        }
        let (package, sink) = w.finish()?;

        info!(
            path = %path,
            chunks = chunks.len(),
            bytes = package.file_len(),
            "staged chunk package"
        );
        staged.push((path.clone(), sink));
        files.push(PackageFileSummary {
            path,
            tag_set: pass.tag_set,
            part: i + 1,
            chunk_count: chunks.len(),
            payload_bytes: package.payload_bytes(),
            file_bytes: package.file_len(),
        });
    }
    Ok(())
}
