use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "chunk store maintenance tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the chunk ids a manifest or chunk package references
    #[command(name = "enumerate")]
    Enumerate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Append each chunk's byte size
        #[arg(long = "includeSizes")]
        include_sizes: bool,
    },

    /// Compare two manifests and report what changed
    #[command(name = "diffManifests")]
    DiffManifests {
        #[arg(long = "manifestA")]
        manifest_a: PathBuf,
        #[arg(long = "manifestB")]
        manifest_b: PathBuf,
        /// Comma separated install tags for A; all tags when omitted
        #[arg(long = "installTagsA")]
        install_tags_a: Option<String>,
        #[arg(long = "installTagsB")]
        install_tags_b: Option<String>,
        /// Comma separated tag set to size separately; may be repeated
        #[arg(long = "compareTagSet")]
        compare_tag_sets: Vec<String>,
        #[arg(long = "outputFile")]
        output_file: Option<PathBuf>,
    },

    /// Delete unreferenced, aged data files from a cloud directory
    #[command(name = "compactify")]
    Compactify {
        #[arg(long = "cloudDir")]
        cloud_dir: PathBuf,
        /// Age in days below which unreferenced files are kept
        #[arg(long = "dataAgeThreshold", default_value_t = 7.0)]
        data_age_threshold: f64,
        #[arg(long = "deletedChunkLogFile")]
        deleted_chunk_log_file: Option<PathBuf>,
        /// Only log what would be deleted
        #[arg(long)]
        preview: bool,
    },

    /// Write the chunks a manifest needs into chunk package files
    #[command(name = "packageChunks")]
    PackageChunks {
        #[arg(long = "manifestFile")]
        manifest_file: PathBuf,
        #[arg(long = "outputFile")]
        output_file: PathBuf,
        #[arg(long = "prevManifestFile")]
        prev_manifest_file: Option<PathBuf>,
        /// Where chunk data is read from; defaults to the manifest's directory
        #[arg(long = "cloudDir")]
        cloud_dir: Option<PathBuf>,
        #[arg(long = "maxOutputFileSize")]
        max_output_file_size: Option<u64>,
        #[arg(long = "resultDataFile")]
        result_data_file: Option<PathBuf>,
        /// Comma separated tag set; repeat for additional passes
        #[arg(long = "tagSets")]
        tag_sets: Vec<String>,
    },

    /// Build a delta manifest that shrinks the patch from A to B
    #[command(name = "chunkDeltaOptimise")]
    ChunkDeltaOptimise {
        #[arg(long = "manifestA")]
        manifest_a: PathBuf,
        #[arg(long = "manifestB")]
        manifest_b: PathBuf,
        /// Defaults to B's directory
        #[arg(long = "cloudDir")]
        cloud_dir: Option<PathBuf>,
        #[arg(long = "scanWindowSize")]
        scan_window_size: Option<u32>,
        #[arg(long = "outputChunkSize")]
        output_chunk_size: Option<u32>,
    },
}

/// Rewrite single-dash long flags (`-input=x`, `-preview`) to the
/// double-dash form clap expects. The program name and mode are untouched.
pub fn normalize_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(i, a)| {
            let long_single = a.len() > 2 && a.starts_with('-') && !a.starts_with("--");
            if i > 0 && long_single {
                format!("-{a}")
            } else {
                a
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dash_flags_become_long() {
        let got = normalize_args([
            "chunktool",
            "compactify",
            "-cloudDir=/tmp/c",
            "-preview",
            "--dataAgeThreshold=3",
            "-h",
        ]);
        assert_eq!(
            got,
            vec![
                "chunktool",
                "compactify",
                "--cloudDir=/tmp/c",
                "--preview",
                "--dataAgeThreshold=3",
                "-h",
            ]
        );
    }

    #[test]
    fn repeated_tag_sets_accumulate() {
        let cli = Cli::try_parse_from(normalize_args([
            "chunktool",
            "packageChunks",
            "-manifestFile=m.manifest",
            "-outputFile=out.pkg",
            "-tagSets=a,b",
            "-tagSets=c",
            "-maxOutputFileSize=100",
        ]))
        .unwrap();
        match cli.command {
            Commands::PackageChunks {
                tag_sets,
                max_output_file_size,
                cloud_dir,
                ..
            } => {
                assert_eq!(tag_sets, vec!["a,b", "c"]);
                assert_eq!(max_output_file_size, Some(100));
                assert!(cloud_dir.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn compactify_threshold_defaults_to_a_week() {
        let cli =
            Cli::try_parse_from(normalize_args(["chunktool", "compactify", "-cloudDir=x"])).unwrap();
        match cli.command {
            Commands::Compactify {
                data_age_threshold,
                preview,
                ..
            } => {
                assert_eq!(data_age_threshold, 7.0);
                assert!(!preview);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn missing_required_flag_is_an_error() {
        assert!(Cli::try_parse_from(normalize_args(["chunktool", "enumerate", "-input=x"])).is_err());
    }
}
