//! List the chunks a manifest or chunk package refers to.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::container::package::{ChunkPackage, peek_format_version};
use crate::domain::{ChunkId, Diagnostic, Digest};
use crate::error::Result;
use crate::store::ChunkStore;

pub mod set;

pub use set::{ChunkIndex, ManifestSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFormat {
    Manifest,
    Package,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub rolling_hash: Option<u64>,
    pub digest: Option<Digest>,
    pub size: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Enumeration {
    pub format: InputFormat,
    pub records: Vec<ChunkRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Sniff the input's format and list the chunks it references.
///
/// Manifests are listed with their delta manifests, base first and without
/// repeats. Packages are listed in file order; an entry whose header carries
/// the zero id is reported and skipped, but any read failure ends the run.
pub fn enumerate(store: &dyn ChunkStore, path: &str) -> Result<Enumeration> {
    let version = {
        let mut r = store.open(path)?;
        peek_format_version(&mut r)?
    };
    let out = if version > 0 {
        enumerate_package(store, path)?
    } else {
        enumerate_manifest(store, path)?
    };
    info!(
        input = path,
        format = ?out.format,
        records = out.records.len(),
        diagnostics = out.diagnostics.len(),
        "enumeration complete"
    );
    Ok(out)
}

fn enumerate_manifest(store: &dyn ChunkStore, path: &str) -> Result<Enumeration> {
    let set = ManifestSet::load(store, path)?;
    let index = set.chunk_index();
    let records = set
        .chunk_ids()
        .into_iter()
        .map(|id| ChunkRecord {
            id,
            rolling_hash: None,
            digest: None,
            size: index.get(&id).map(|(_, c)| c.file_size),
        })
        .collect();
    Ok(Enumeration {
        format: InputFormat::Manifest,
        records,
        diagnostics: Vec::new(),
    })
}

fn enumerate_package(store: &dyn ChunkStore, path: &str) -> Result<Enumeration> {
    let file_len = store.size(path)?;
    let mut r = store.open(path)?;
    let pkg = ChunkPackage::read_header(&mut r, file_len)?;
    let mut records = Vec::with_capacity(pkg.contents.len());
    let mut diagnostics = Vec::new();
    for (i, loc) in pkg.contents.iter().enumerate() {
        let header = ChunkPackage::read_chunk_header(&mut r, loc, file_len)?;
        if !header.id.is_valid() {
            error!(input = path, entry = i, "package entry has an invalid chunk id");
            diagnostics.push(Diagnostic::new(
                format!("{path}#{i}"),
                "invalid chunk id in chunk header",
            ));
            continue;
        }
        records.push(ChunkRecord {
            id: header.id,
            rolling_hash: Some(header.rolling_hash),
            digest: Some(header.digest),
            size: Some(loc.byte_size),
        });
    }
    Ok(Enumeration {
        format: InputFormat::Package,
        records,
        diagnostics,
    })
}

/// One line per record: `ID[\tROLLING\tDIGEST][\tSIZE]`.
pub fn write_records(mut w: impl Write, records: &[ChunkRecord], include_sizes: bool) -> Result<()> {
    for r in records {
        write!(w, "{}", r.id)?;
        if let (Some(rolling), Some(digest)) = (r.rolling_hash, r.digest) {
            write!(w, "\t{rolling:016X}\t{}", digest.to_hex())?;
        }
        if include_sizes {
            write!(w, "\t{}", r.size.unwrap_or(0))?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Enumerate `input` and write the listing to `output` in `out_store`.
pub fn enumerate_to_file(
    store: &dyn ChunkStore,
    input: &str,
    out_store: &dyn ChunkStore,
    output: &str,
    include_sizes: bool,
) -> Result<Enumeration> {
    let e = enumerate(store, input)?;
    let mut buf = Vec::new();
    write_records(&mut buf, &e.records, include_sizes)?;
    out_store.write(output, &buf)?;
    Ok(e)
}
