#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod collect;
pub mod config;
pub mod effects;
pub mod export;
pub mod loader;
pub mod pipeline;
pub mod store;

pub use archivist_domain as domain;

pub use crate::collect::{ClassifiedRoot, Classifier, EntryCollector};
pub use crate::config::{
    ArchiveConfig, CarryForwardConfig, ConfigError, DistributionConfig, EnvSnapshot,
    OriginalConfig,
};
pub use crate::effects::{FileSystem, SystemFileSystem};
pub use crate::export::{export_snapshot, ExportSummary};
pub use crate::loader::{load_entries, load_entry, LoadSummary};
pub use crate::pipeline::{run_archive, CarryForwardRun, DistributionRun, RunSummary};
pub use crate::store::{
    ArchiveStore, BackendKind, DistributionStats, RecordOutcome, SnapshotFile, StoreError,
    StoreStats,
};
