use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use chunkstore_core::error::{ChunkStoreError, Result};
use chunkstore_core::{
    ChunkStoreServices, CompactifyOptions, DeltaOptions, DiffOptions, Manifest, ManifestSet,
    PackageOptions, compactify, diff_manifests, enumerate_to_file, optimise, package_chunks,
};

/// Split a comma separated list, trimming each item. Empty items are kept:
/// `""` is the tag carried by untagged files.
pub fn parse_csv(s: &str) -> BTreeSet<String> {
    s.split(',').map(|t| t.trim().to_string()).collect()
}

fn load_manifest(services: &ChunkStoreServices, path: &Path) -> Result<Manifest> {
    let (store, name) = services.open_containing(path)?;
    Manifest::from_bytes(&store.read(&name)?)
}

fn write_local(services: &ChunkStoreServices, path: &Path, data: &[u8]) -> Result<()> {
    let (store, name) = services.open_containing(path)?;
    store.write(&name, data)
}

pub fn handle_enumerate(
    services: &ChunkStoreServices,
    input: PathBuf,
    output: PathBuf,
    include_sizes: bool,
) -> Result<()> {
    let (store, name) = services.open_containing(&input)?;
    let (out_store, out_name) = services.open_containing(&output)?;
    let e = enumerate_to_file(store.as_ref(), &name, out_store.as_ref(), &out_name, include_sizes)?;
    for d in &e.diagnostics {
        warn!(subject = %d.subject, "{}", d.message);
    }
    info!(
        output = %output.display(),
        records = e.records.len(),
        "wrote chunk listing"
    );
    Ok(())
}

pub fn handle_diff_manifests(
    services: &ChunkStoreServices,
    manifest_a: PathBuf,
    manifest_b: PathBuf,
    install_tags_a: Option<String>,
    install_tags_b: Option<String>,
    compare_tag_sets: Vec<String>,
    output_file: Option<PathBuf>,
) -> Result<()> {
    let opts = DiffOptions {
        tags_a: install_tags_a.as_deref().map(parse_csv).unwrap_or_default(),
        tags_b: install_tags_b.as_deref().map(parse_csv).unwrap_or_default(),
        compare_tag_sets: compare_tag_sets.iter().map(|s| parse_csv(s)).collect(),
    };
    opts.validate()?;

    let a = load_manifest(services, &manifest_a)?;
    let b = load_manifest(services, &manifest_b)?;
    let report = diff_manifests(&a, &b, &opts)?;
    let json = report.to_json()?;
    match output_file {
        Some(p) => {
            write_local(services, &p, &json)?;
            info!(output = %p.display(), "wrote diff report");
        }
        None => println!("{}", String::from_utf8_lossy(&json)),
    }
    Ok(())
}

pub fn handle_compactify(
    services: &ChunkStoreServices,
    cloud_dir: PathBuf,
    data_age_threshold: f64,
    deleted_chunk_log_file: Option<PathBuf>,
    preview: bool,
) -> Result<()> {
    let opts = CompactifyOptions {
        deleted_chunk_log: deleted_chunk_log_file,
        preview,
        ..CompactifyOptions::with_threshold_days(data_age_threshold)?
    };
    let store = services.open_store(&cloud_dir)?;
    let stats = compactify(store.as_ref(), &opts)?;
    info!(
        processed = stats.processed.files,
        processed_bytes = stats.processed.bytes,
        skipped_young = stats.skipped_young.files,
        unknown = stats.unknown.files,
        deleted = stats.deleted.files,
        deleted_bytes = stats.deleted.bytes,
        warnings = stats.diagnostics.len(),
        "compactify finished"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn handle_package_chunks(
    services: &ChunkStoreServices,
    manifest_file: PathBuf,
    output_file: PathBuf,
    prev_manifest_file: Option<PathBuf>,
    cloud_dir: Option<PathBuf>,
    max_output_file_size: Option<u64>,
    result_data_file: Option<PathBuf>,
    tag_sets: Vec<String>,
) -> Result<()> {
    if max_output_file_size == Some(0) {
        return Err(ChunkStoreError::Argument(
            "maxOutputFileSize must be greater than zero".into(),
        ));
    }
    let opts = PackageOptions {
        max_output_file_size,
        tag_sets: tag_sets.iter().map(|s| parse_csv(s)).collect(),
    };

    let (mstore, mname) = services.open_containing(&manifest_file)?;
    let target = ManifestSet::load(mstore.as_ref(), &mname)?;
    let previous = match &prev_manifest_file {
        Some(p) => {
            let (pstore, pname) = services.open_containing(p)?;
            Some(ManifestSet::load(pstore.as_ref(), &pname)?)
        }
        None => None,
    };
    let cloud = match &cloud_dir {
        Some(d) => services.open_store(d)?,
        None => services.open_containing(&manifest_file)?.0,
    };
    let (out_store, out_name) = services.open_containing(&output_file)?;

    let summary = package_chunks(
        &target,
        previous.as_ref(),
        cloud.as_ref(),
        out_store.as_ref(),
        &out_name,
        &opts,
    )?;
    if let Some(p) = result_data_file {
        write_local(services, &p, &summary.to_json()?)?;
        info!(output = %p.display(), "wrote package summary");
    }
    Ok(())
}

pub fn handle_chunk_delta_optimise(
    services: &ChunkStoreServices,
    manifest_a: PathBuf,
    manifest_b: PathBuf,
    cloud_dir: Option<PathBuf>,
    scan_window_size: Option<u32>,
    output_chunk_size: Option<u32>,
) -> Result<()> {
    let defaults = DeltaOptions::default();
    let requested = DeltaOptions {
        scan_window_size: scan_window_size.unwrap_or(defaults.scan_window_size),
        output_chunk_size: output_chunk_size.unwrap_or(defaults.output_chunk_size),
    };
    let opts = requested.clamped();
    if opts.scan_window_size != requested.scan_window_size
        || opts.output_chunk_size != requested.output_chunk_size
    {
        warn!(
            scan_window_size = opts.scan_window_size,
            output_chunk_size = opts.output_chunk_size,
            "delta options clamped to supported range"
        );
    }

    let a = load_manifest(services, &manifest_a)?;
    let b = load_manifest(services, &manifest_b)?;
    let cloud = match &cloud_dir {
        Some(d) => services.open_store(d)?,
        None => services.open_containing(&manifest_b)?.0,
    };
    let summary = optimise(cloud.as_ref(), &a, &b, &opts)?;
    info!(
        delta = summary.delta_path.as_deref().unwrap_or("<none>"),
        reused = summary.reused_existing,
        original_bytes = summary.original_unknown_compressed_bytes,
        final_bytes = summary.final_unknown_compressed_bytes,
        "delta optimisation finished"
    );
    Ok(())
}
