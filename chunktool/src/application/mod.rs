pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use chunkstore_core::ChunkStoreServices;
use chunkstore_core::error::Result;

pub fn run(cli: Cli, services: &ChunkStoreServices) -> Result<()> {
    match cli.command {
        Commands::Enumerate {
            input,
            output,
            include_sizes,
        } => handlers::handle_enumerate(services, input, output, include_sizes),
        Commands::DiffManifests {
            manifest_a,
            manifest_b,
            install_tags_a,
            install_tags_b,
            compare_tag_sets,
            output_file,
        } => handlers::handle_diff_manifests(
            services,
            manifest_a,
            manifest_b,
            install_tags_a,
            install_tags_b,
            compare_tag_sets,
            output_file,
        ),
        Commands::Compactify {
            cloud_dir,
            data_age_threshold,
            deleted_chunk_log_file,
            preview,
        } => handlers::handle_compactify(
            services,
            cloud_dir,
            data_age_threshold,
            deleted_chunk_log_file,
            preview,
        ),
        Commands::PackageChunks {
            manifest_file,
            output_file,
            prev_manifest_file,
            cloud_dir,
            max_output_file_size,
            result_data_file,
            tag_sets,
        } => handlers::handle_package_chunks(
            services,
            manifest_file,
            output_file,
            prev_manifest_file,
            cloud_dir,
            max_output_file_size,
            result_data_file,
            tag_sets,
        ),
        Commands::ChunkDeltaOptimise {
            manifest_a,
            manifest_b,
            cloud_dir,
            scan_window_size,
            output_chunk_size,
        } => handlers::handle_chunk_delta_optimise(
            services,
            manifest_a,
            manifest_b,
            cloud_dir,
            scan_window_size,
            output_chunk_size,
        ),
    }
}
