//! One full archive load: original baseline, every distribution, then the
//! carry-forward projections.

use anyhow::{Context, Result};
use archivist_domain::timestamp::start_of_day;
use archivist_domain::{DistributionCode, EntryFilter};
use serde::Serialize;
use tracing::{info, warn};

use crate::collect::{Classifier, EntryCollector};
use crate::config::{ArchiveConfig, CarryForwardConfig, DistributionConfig, OriginalConfig};
use crate::effects::FileSystem;
use crate::loader::{load_entries, LoadSummary};
use crate::store::ArchiveStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DistributionRun {
    pub distribution: DistributionCode,
    /// Patch or client directories classified under the distribution root.
    pub roots: u64,
    pub load: LoadSummary,
    /// Set when the distribution root does not exist.
    pub missing: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CarryForwardRun {
    pub from: DistributionCode,
    pub to: DistributionCode,
    pub through: Option<u16>,
    pub rows: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub original: Option<LoadSummary>,
    pub distributions: Vec<DistributionRun>,
    pub carry_forward: Vec<CarryForwardRun>,
    pub blobs: u64,
    pub memberships: u64,
}

/// Runs the complete load described by `config` against `store`.
///
/// Every write is idempotent, so an interrupted run can simply be restarted.
pub fn run_archive(
    config: &ArchiveConfig,
    store: &mut ArchiveStore,
    fs: &dyn FileSystem,
) -> Result<RunSummary> {
    let filter = config.entry_filter();
    let mut summary = RunSummary::default();

    if let Some(original) = &config.original {
        summary.original = load_original(config, original, &filter, store, fs)?;
    }

    for dist in &config.distributions {
        summary
            .distributions
            .push(load_distribution(config, dist, &filter, store, fs)?);
    }

    for carry in &config.carry_forward {
        summary.carry_forward.push(carry_forward(carry, store)?);
    }

    let (blobs, memberships) = store.row_counts()?;
    summary.blobs = blobs;
    summary.memberships = memberships;
    info!(blobs, memberships, "archive load complete");
    Ok(summary)
}

/// Loads the shared base client once as patch 0 for every descendant
/// distribution.
pub fn load_original(
    config: &ArchiveConfig,
    original: &OriginalConfig,
    filter: &EntryFilter,
    store: &mut ArchiveStore,
    fs: &dyn FileSystem,
) -> Result<Option<LoadSummary>> {
    let path = config.archive_path(&original.path);
    if !fs.is_dir(&path) {
        warn!(path = %path.display(), "original client not found; skipping baseline");
        return Ok(None);
    }
    info!(
        path = %path.display(),
        distributions = original.distributions.len(),
        "loading original baseline"
    );
    let date = Some(start_of_day(original.date));
    let entries = EntryCollector::new(fs, &path, &config.root, filter, 0, date);
    let load = load_entries(store, fs, entries, &original.distributions)
        .context("failed to load the original baseline")?;
    Ok(Some(load))
}

pub fn load_distribution(
    config: &ArchiveConfig,
    dist: &DistributionConfig,
    filter: &EntryFilter,
    store: &mut ArchiveStore,
    fs: &dyn FileSystem,
) -> Result<DistributionRun> {
    let mut run = DistributionRun {
        distribution: dist.code.clone(),
        roots: 0,
        load: LoadSummary::default(),
        missing: false,
    };
    let path = config.archive_path(&dist.path);
    if !fs.is_dir(&path) {
        warn!(
            dist = %dist.code,
            path = %path.display(),
            "distribution root not found; skipping"
        );
        run.missing = true;
        return Ok(run);
    }

    info!(dist = %dist.code, layout = dist.layout.as_str(), "loading distribution");
    let targets = std::slice::from_ref(&dist.code);
    for root in Classifier::new(fs, &path, dist.layout) {
        let root = root?;
        run.roots += 1;
        let entries = EntryCollector::new(
            fs,
            &root.subtree,
            &config.root,
            filter,
            root.patch,
            root.date,
        );
        run.load += load_entries(store, fs, entries, targets)
            .with_context(|| format!("failed to load {}", root.subtree.display()))?;
    }
    Ok(run)
}

pub fn carry_forward(
    carry: &CarryForwardConfig,
    store: &mut ArchiveStore,
) -> Result<CarryForwardRun> {
    let through = match carry.through {
        Some(patch) => Some(patch),
        None => store.latest_patch(&carry.from)?,
    };
    let rows = match through {
        Some(patch) => store.carry_forward(&carry.from, &carry.to, Some(patch))?,
        None => {
            warn!(from = %carry.from, to = %carry.to, "no history to carry forward");
            0
        }
    };
    info!(from = %carry.from, to = %carry.to, ?through, rows, "carried forward");
    Ok(CarryForwardRun {
        from: carry.from.clone(),
        to: carry.to.clone(),
        through,
        rows: rows as u64,
    })
}
