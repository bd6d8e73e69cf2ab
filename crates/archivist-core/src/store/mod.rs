//! SQLite-backed content store and membership index.
//!
//! Layout:
//! - `filedata`: one row per distinct CRC-32, holding either the
//!   zlib-compressed bytes or an archive-relative key.
//! - `files`: one row per (distribution, patch, path), referencing `filedata`.
//! - `meta`: schema version and the backend the index was created with.
//!
//! Every write is insert-or-ignore, so re-running a load over an unchanged
//! archive leaves both tables untouched.

mod blobs;
mod index;
mod membership;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use archivist_domain::{BlobId, Checksum, DistributionCode};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use tracing::debug;

pub use membership::{DistributionStats, SnapshotFile, StoreStats};

const SCHEMA_VERSION: u32 = 1;
const META_KEY_SCHEMA_VERSION: &str = "schema_version";
const META_KEY_BACKEND: &str = "backend";
const META_KEY_CREATED_BY: &str = "created_by_version";
const ARCHIVIST_VERSION: &str = env!("CARGO_PKG_VERSION");

time::serde::format_description!(
    index_date_time,
    PrimitiveDateTime,
    "[year]-[month]-[day] [hour]:[minute]:[second]"
);

/// Errors surfaced by the archive index.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no index exists at {0}")]
    MissingIndex(PathBuf),
    #[error("blob with checksum {checksum} is missing immediately after insert")]
    MissingBlob { checksum: Checksum },
    #[error("blob {0} has neither embedded data nor an external key")]
    EmptyBlob(BlobId),
    #[error("blob {0} does not exist")]
    UnknownBlob(BlobId),
    #[error("index metadata is missing required key '{0}'")]
    MissingMeta(String),
    #[error("index {key} is incompatible: expected {expected}, found {found}")]
    IncompatibleIndex {
        key: String,
        expected: String,
        found: String,
    },
    #[error("unknown storage backend '{0}'")]
    UnknownBackend(String),
    #[error("distribution '{distribution}' has no patch at or below {patch}")]
    MissingPatch {
        distribution: DistributionCode,
        patch: u16,
    },
}

/// Where blob bytes live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// zlib-compressed bytes stored in `filedata.data`.
    #[default]
    Embedded,
    /// Archive-root-relative path of the first file seen with the checksum.
    External,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::External => "external",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "external" => Ok(Self::External),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// What a single entry write changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordOutcome {
    pub fileid: BlobId,
    pub checksum: Checksum,
    pub blob_created: bool,
    /// Per target distribution, whether a new membership row was written.
    pub memberships: Vec<(DistributionCode, bool)>,
}

impl RecordOutcome {
    #[must_use]
    pub fn memberships_created(&self) -> usize {
        self.memberships.iter().filter(|(_, added)| *added).count()
    }
}

pub struct ArchiveStore {
    conn: Connection,
    path: PathBuf,
    backend: BackendKind,
}

impl fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("path", &self.path)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl ArchiveStore {
    /// Opens (creating if needed) the index at `path` for writing with the
    /// given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, or if it was
    /// created with a different schema version or backend.
    pub fn open(path: &Path, backend: BackendKind) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut conn = index::connection(path)?;
        index::init_schema(&conn)?;
        index::ensure_meta(&mut conn, backend)?;
        debug!(path = %path.display(), %backend, "opened archive index");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            backend,
        })
    }

    /// Opens an index that must already exist, adopting its recorded backend.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(StoreError::MissingIndex(path.to_path_buf()).into());
        }
        let conn = index::connection(path)?;
        index::enforce_schema_version(&conn)?;
        let backend = index::meta_value(&conn, META_KEY_BACKEND)?
            .ok_or_else(|| StoreError::MissingMeta(META_KEY_BACKEND.to_string()))?
            .parse::<BackendKind>()?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            backend,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub(crate) fn with_immediate_tx<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start archive index transaction")?;
        let result = f(&tx)?;
        tx.commit().context("failed to commit archive index transaction")?;
        Ok(result)
    }

    /// Row counts of (`filedata`, `files`).
    pub fn row_counts(&self) -> Result<(u64, u64)> {
        let blobs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM filedata", [], |row| row.get(0))?;
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok((to_u64(blobs), to_u64(files)))
    }

    /// Looks up the blob id for a checksum.
    pub fn blob_id(&self, checksum: Checksum) -> Result<Option<BlobId>> {
        find_blob(&self.conn, checksum)
    }
}

fn find_blob(conn: &Connection, checksum: Checksum) -> Result<Option<BlobId>> {
    conn.query_row(
        "SELECT id FROM filedata WHERE checksum = ?1",
        params![i64::from(checksum.value())],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|id| id.map(BlobId))
    .context("failed to look up blob by checksum")
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn to_patch(value: i64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
