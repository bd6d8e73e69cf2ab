//! Materialises a distribution snapshot as a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use archivist_domain::timestamp::unix_seconds;
use archivist_domain::DistributionCode;
use filetime::FileTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::effects::FileSystem;
use crate::store::ArchiveStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub distribution: DistributionCode,
    pub requested_patch: u16,
    /// The highest recorded patch at or below the requested one.
    pub patch: u16,
    pub files: u64,
    pub bytes: u64,
}

/// Writes every file of `distribution` as of `patch` under `dest`, with each
/// file's mtime set to its membership date when one is recorded.
pub fn export_snapshot(
    store: &ArchiveStore,
    source: &dyn FileSystem,
    archive_root: &Path,
    distribution: &DistributionCode,
    patch: u16,
    dest: &Path,
) -> Result<ExportSummary> {
    let resolved = store.normalize_patch(distribution, patch)?;
    let files = store.snapshot(distribution, resolved)?;
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

    let mut summary = ExportSummary {
        distribution: distribution.clone(),
        requested_patch: patch,
        patch: resolved,
        files: 0,
        bytes: 0,
    };
    for file in &files {
        let target = export_path(dest, &file.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let bytes = store.read_blob(source, file.fileid, archive_root)?;
        fs::write(&target, &bytes)
            .with_context(|| format!("failed to write {}", target.display()))?;
        if let Some(date) = file.date {
            let mtime = FileTime::from_unix_time(unix_seconds(date), 0);
            filetime::set_file_mtime(&target, mtime)
                .with_context(|| format!("failed to set mtime on {}", target.display()))?;
        }
        debug!(path = %file.path, fileid = %file.fileid, "exported file");
        summary.files += 1;
        summary.bytes += bytes.len() as u64;
    }
    info!(
        dist = %distribution,
        patch = resolved,
        files = summary.files,
        dest = %dest.display(),
        "exported snapshot"
    );
    Ok(summary)
}

fn export_path(dest: &Path, logical: &str) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    for segment in logical.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            bail!("refusing to export unsafe logical path '{logical}'");
        }
        target.push(segment);
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_paths_stay_inside_the_destination() -> Result<()> {
        let dest = Path::new("/tmp/out");
        assert_eq!(
            export_path(dest, "data/item/item.sah")?,
            dest.join("data").join("item").join("item.sah")
        );
        assert!(export_path(dest, "data/../../etc/passwd").is_err());
        assert!(export_path(dest, "/etc/passwd").is_err());
        Ok(())
    }
}
