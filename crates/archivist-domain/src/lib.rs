#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod classify;
pub mod content;
pub mod distribution;
pub mod entry;
pub mod timestamp;

pub use classify::{
    parse_current_version, parse_episode_token, parse_patch_token, EpisodeToken, PatchToken,
    PatchTokenError,
};
pub use content::{BlobId, Checksum, Membership};
pub use distribution::{ClientLayout, DistributionCode, InvalidDistributionCode};
pub use entry::{
    CollectError, EntryFilter, FileEntry, DATA_SEGMENT, DEFAULT_RETAINED_EXTENSIONS,
    LAUNCHER_FILENAME, PATCH_EXTENSION,
};
