#![forbid(unsafe_code)]

pub mod domain;
pub mod error;
pub mod paths;
pub mod services;

pub mod util {
    pub mod rolling;
}

pub mod codec;

pub mod container {
    pub mod chunk;
    pub mod chunktab;
    pub mod manifest;
    pub mod manifest_header;
    pub mod package;
}

pub mod store;

pub mod read {
    pub mod chunk;
}

pub mod compactify;
pub mod delta;
pub mod diff;
pub mod enumerate;

pub mod pack {
    pub mod plan;
    pub mod writer;
}

// Re-exports: stable API surface
pub use compactify::{CompactifyOptions, CompactifyStats, compactify};
pub use container::manifest::Manifest;
pub use delta::{DeltaOptions, DeltaSummary, optimise};
pub use diff::{DiffOptions, DiffReport, diff_manifests};
pub use enumerate::{Enumeration, ManifestSet, enumerate, enumerate_to_file};
pub use error::{ChunkStoreError, Result};
pub use pack::plan::PackageOptions;
pub use pack::writer::{PackageSummary, package_chunks};
pub use services::ChunkStoreServices;
pub use store::ChunkStore;
