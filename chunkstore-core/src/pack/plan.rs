use std::collections::{BTreeSet, HashSet};
use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::container::chunk;
use crate::domain::ChunkId;
use crate::enumerate::ManifestSet;
use crate::error::{ChunkStoreError, Result};
use crate::paths;
use crate::store::ChunkStore;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackageOptions {
    /// Upper bound on payload bytes per output file. `None` means one file per pass.
    pub max_output_file_size: Option<u64>,
    /// Processed in order; each pass only takes chunks no earlier pass wrote.
    pub tag_sets: Vec<BTreeSet<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedChunk {
    pub id: ChunkId,
    pub path: String,
    /// Stored payload bytes, chunk header excluded.
    pub payload_size: u64,
}

#[derive(Clone, Debug)]
pub struct PassPlan {
    /// 1-based tag-set index, `None` when no tag-sets were given.
    pub tag_set: Option<usize>,
    pub tags: BTreeSet<String>,
    pub chunks: Vec<PlannedChunk>,
    pub parts: Vec<Range<usize>>,
}

#[derive(Clone, Debug)]
pub struct PackagePlan {
    pub required: usize,
    pub excluded_by_previous: usize,
    pub passes: Vec<PassPlan>,
}

/// Work out which chunks go into which output file.
pub fn plan_package(
    target: &ManifestSet,
    previous: Option<&ManifestSet>,
    cloud: &dyn ChunkStore,
    opts: &PackageOptions,
) -> Result<PackagePlan> {
    if opts.max_output_file_size == Some(0) {
        return Err(ChunkStoreError::Config(
            "max output file size must be greater than zero".into(),
        ));
    }

    let all = target.chunk_ids();
    let prev: HashSet<ChunkId> = previous
        .map(|p| p.chunk_ids().into_iter().collect())
        .unwrap_or_default();
    let required: Vec<ChunkId> = all.iter().copied().filter(|id| !prev.contains(id)).collect();
    let excluded = all.len() - required.len();

    let index = target.chunk_index();
    let sized: Vec<PlannedChunk> = required
        .par_iter()
        .map(|id| -> Result<PlannedChunk> {
            let (m, info) = index
                .get(id)
                .ok_or_else(|| ChunkStoreError::NotFound(format!("chunk info for {id}")))?;
            let path = paths::data_path(m, info);
            let size = cloud.size(&path)?;
            let payload_size = size.checked_sub(chunk::HEADER_LEN).ok_or_else(|| {
                ChunkStoreError::truncated(path.clone(), chunk::HEADER_LEN, size)
            })?;
            Ok(PlannedChunk {
                id: *id,
                path,
                payload_size,
            })
        })
        .collect::<Result<_>>()?;

    let mut passes = Vec::new();
    if opts.tag_sets.is_empty() {
        passes.push(pass(None, BTreeSet::new(), sized, opts.max_output_file_size));
    } else {
        let mut packaged: HashSet<ChunkId> = HashSet::new();
        for (k, tags) in opts.tag_sets.iter().enumerate() {
            let wanted = target.chunks_for_tags(tags);
            let chunks: Vec<PlannedChunk> = sized
                .iter()
                .filter(|c| wanted.contains(&c.id) && !packaged.contains(&c.id))
                .cloned()
                .collect();
            packaged.extend(chunks.iter().map(|c| c.id));
            if chunks.is_empty() {
                warn!(tag_set = k + 1, ?tags, "tag-set pass has no new chunks");
            }
            passes.push(pass(Some(k + 1), tags.clone(), chunks, opts.max_output_file_size));
        }
    }
    debug!(
        required = required.len(),
        excluded,
        passes = passes.len(),
        "package plan ready"
    );
    Ok(PackagePlan {
        required: required.len(),
        excluded_by_previous: excluded,
        passes,
    })
}

fn pass(
    tag_set: Option<usize>,
    tags: BTreeSet<String>,
    chunks: Vec<PlannedChunk>,
    max: Option<u64>,
) -> PassPlan {
    let sizes: Vec<u64> = chunks.iter().map(|c| c.payload_size).collect();
    PassPlan {
        tag_set,
        tags,
        parts: split_parts(&sizes, max),
        chunks,
    }
}

/// Greedy split so no part's payload exceeds `max`, except a part holding a
/// single chunk that is larger than `max` on its own.
pub fn split_parts(sizes: &[u64], max: Option<u64>) -> Vec<Range<usize>> {
    if sizes.is_empty() {
        return Vec::new();
    }
    let Some(max) = max else {
        return vec![0..sizes.len()];
    };
    let mut parts = Vec::new();
    let mut start = 0;
    let mut acc = 0u64;
    for (i, &s) in sizes.iter().enumerate() {
        if i > start && acc + s > max {
            parts.push(start..i);
            start = i;
            acc = 0;
        }
        acc += s;
    }
    parts.push(start..sizes.len());
    parts
}

/// `{stem}[.tagset{k}][.part{i}].{ext}`, with the part index zero-padded to
/// `max(2, digits(part_count))`.
pub fn part_file_name(base: &str, tag_set: Option<usize>, part: usize, part_count: usize) -> String {
    let (dir, name) = match base.rsplit_once('/') {
        Some((d, n)) => (Some(d), n),
        None => (None, base),
    };
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (name, None),
    };
    let mut out = String::new();
    if let Some(d) = dir {
        out.push_str(d);
        out.push('/');
    }
    out.push_str(stem);
    if let Some(k) = tag_set {
        out.push_str(&format!(".tagset{k}"));
    }
    if part_count > 1 {
        let width = part_count.to_string().len().max(2);
        out.push_str(&format!(".part{part:0width$}"));
    }
    if let Some(e) = ext {
        out.push('.');
        out.push_str(e);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_chunks_two_per_part() {
        let parts = split_parts(&[10; 5], Some(20));
        let counts: Vec<_> = parts.iter().map(|r| r.len()).collect();
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn oversized_chunk_gets_its_own_part() {
        let parts = split_parts(&[5, 50, 5, 5], Some(12));
        assert_eq!(parts, vec![0..1, 1..2, 2..4]);
    }

    #[test]
    fn no_limit_means_one_part() {
        assert_eq!(split_parts(&[1 << 40, 1 << 40], None), vec![0..2]);
        assert!(split_parts(&[], Some(3)).is_empty());
    }

    #[test]
    fn names_pad_parts_and_tag_sets() {
        assert_eq!(part_file_name("out/pkg.bin", None, 1, 1), "out/pkg.bin");
        assert_eq!(part_file_name("pkg.bin", None, 3, 3), "pkg.part03.bin");
        assert_eq!(part_file_name("pkg.bin", Some(2), 7, 120), "pkg.tagset2.part007.bin");
        assert_eq!(part_file_name("pkg", Some(1), 1, 1), "pkg.tagset1");
    }
}
