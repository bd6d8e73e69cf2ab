use std::ops::AddAssign;

use anyhow::Result;
use archivist_domain::timestamp::format_date_time;
use archivist_domain::{Checksum, DistributionCode, FileEntry};
use serde::Serialize;
use tracing::info;

use crate::effects::FileSystem;
use crate::store::{ArchiveStore, RecordOutcome};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub entries: u64,
    pub blobs_created: u64,
    pub memberships_created: u64,
}

impl AddAssign for LoadSummary {
    fn add_assign(&mut self, other: Self) {
        self.entries += other.entries;
        self.blobs_created += other.blobs_created;
        self.memberships_created += other.memberships_created;
    }
}

impl LoadSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.entries += 1;
        self.blobs_created += u64::from(outcome.blob_created);
        self.memberships_created += outcome.memberships_created() as u64;
    }
}

/// Reads one entry, checksums it, and records it for every distribution in
/// `distributions`.
///
/// # Errors
///
/// An unreadable file is fatal: the archive cannot be reconstructed without
/// it, so the error is surfaced rather than skipped.
pub fn load_entry(
    store: &mut ArchiveStore,
    fs: &dyn FileSystem,
    entry: &FileEntry,
    distributions: &[DistributionCode],
) -> Result<RecordOutcome> {
    let bytes = fs.read(entry.abspath())?;
    let checksum = Checksum::of(&bytes);
    let outcome = store.record_entry(entry, checksum, &bytes, distributions)?;

    let date = entry
        .date()
        .map_or_else(|| "none".to_string(), format_date_time);
    for (dist, inserted) in &outcome.memberships {
        info!(
            fileid = %outcome.fileid,
            path = entry.path(),
            dist = %dist,
            checksum = %checksum,
            patch = entry.patch(),
            date = %date,
            inserted,
            "indexed file"
        );
    }
    Ok(outcome)
}

/// Loads entries one at a time, each in its own transaction, stopping at the
/// first collection or I/O failure.
pub fn load_entries<I>(
    store: &mut ArchiveStore,
    fs: &dyn FileSystem,
    entries: I,
    distributions: &[DistributionCode],
) -> Result<LoadSummary>
where
    I: IntoIterator<Item = Result<FileEntry>>,
{
    let mut summary = LoadSummary::default();
    for entry in entries {
        let outcome = load_entry(store, fs, &entry?, distributions)?;
        summary.record(&outcome);
    }
    Ok(summary)
}
