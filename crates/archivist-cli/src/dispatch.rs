use std::path::Path;

use anyhow::{Context, Result};
use archivist_core::domain::{CollectError, DistributionCode};
use archivist_core::{
    export_snapshot, run_archive, ArchiveConfig, ArchiveStore, ConfigError, EnvSnapshot,
    StoreError, SystemFileSystem,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::{CommandGroupCli, ExportArgs, IndexArgs, LoadArgs, SnapshotArgs};
use crate::output::ExecutionOutcome;

pub fn command_name(group: &CommandGroupCli) -> &'static str {
    match group {
        CommandGroupCli::Load(_) => "load",
        CommandGroupCli::Snapshot(_) => "snapshot",
        CommandGroupCli::Export(_) => "export",
        CommandGroupCli::Stats(_) => "stats",
        CommandGroupCli::Config => "config",
    }
}

/// Runs one command, folding recognised user errors into the outcome.
pub fn dispatch_command(config_path: Option<&Path>, group: &CommandGroupCli) -> ExecutionOutcome {
    core_call(|| {
        let config = ArchiveConfig::load(config_path, &EnvSnapshot::capture())?;
        match group {
            CommandGroupCli::Load(args) => load(config, args),
            CommandGroupCli::Snapshot(args) => snapshot(&config, args),
            CommandGroupCli::Export(args) => export(&config, args),
            CommandGroupCli::Stats(args) => stats(&config, args),
            CommandGroupCli::Config => show_config(&config),
        }
    })
}

fn core_call<F>(action: F) -> ExecutionOutcome
where
    F: FnOnce() -> Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(outcome) = user_error_outcome(&err) {
                return outcome;
            }
            let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
            ExecutionOutcome::failure(
                err.to_string(),
                json!({
                    "reason": "internal_error",
                    "error": err.to_string(),
                    "issues": issues,
                    "hint": "Re-run with `-vv` or `--trace` to see which file or query failed.",
                }),
            )
        }
    }
}

fn user_error_outcome(err: &anyhow::Error) -> Option<ExecutionOutcome> {
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return Some(ExecutionOutcome::user_error(
            config.to_string(),
            json!({ "reason": "invalid_config" }),
        ));
    }
    if let Some(collect) = err.downcast_ref::<CollectError>() {
        return Some(ExecutionOutcome::user_error(
            err.to_string(),
            json!({
                "reason": "malformed_archive",
                "error": collect.to_string(),
                "hint": "Fix or move the offending file, then re-run `archivist load`; \
                         finished entries are kept.",
            }),
        ));
    }
    let store = err.downcast_ref::<StoreError>()?;
    let (reason, hint) = match store {
        StoreError::MissingIndex(_) => ("missing_index", Some("Run `archivist load` first.")),
        StoreError::IncompatibleIndex { .. } | StoreError::MissingMeta(_) => (
            "incompatible_index",
            Some("Use the backend the index was created with, or point --database at a new file."),
        ),
        StoreError::MissingPatch { .. } => ("missing_patch", None),
        StoreError::UnknownBackend(_) => ("unknown_backend", None),
        StoreError::MissingBlob { .. } | StoreError::EmptyBlob(_) | StoreError::UnknownBlob(_) => {
            return None
        }
    };
    let mut details = json!({ "reason": reason });
    if let Some(hint) = hint {
        details["hint"] = json!(hint);
    }
    Some(ExecutionOutcome::user_error(store.to_string(), details))
}

fn apply_index_args(config: &mut ArchiveConfig, args: &IndexArgs) {
    if let Some(database) = &args.database {
        config.database.clone_from(database);
    }
}

fn load(mut config: ArchiveConfig, args: &LoadArgs) -> Result<ExecutionOutcome> {
    apply_index_args(&mut config, &args.index);
    if let Some(root) = &args.root {
        config.root.clone_from(root);
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    debug!(root = %config.root.display(), database = %config.database.display(), "loading archive");

    let mut store = ArchiveStore::open(&config.database, config.backend)?;
    let summary = run_archive(&config, &mut store, &SystemFileSystem)?;
    let message = format!(
        "indexed {} blobs and {} memberships",
        summary.blobs, summary.memberships
    );
    Ok(ExecutionOutcome::success(message, serde_json::to_value(&summary)?))
}

/// Resolves the requested patch against what the index holds.
fn resolve_patch(
    store: &ArchiveStore,
    dist: &DistributionCode,
    requested: Option<u16>,
) -> Result<u16> {
    match requested {
        Some(patch) => store.normalize_patch(dist, patch),
        None => store.latest_patch(dist)?.ok_or_else(|| {
            StoreError::MissingPatch {
                distribution: dist.clone(),
                patch: u16::MAX,
            }
            .into()
        }),
    }
}

fn open_index(config: &mut ArchiveConfig, args: &IndexArgs) -> Result<ArchiveStore> {
    apply_index_args(config, args);
    ArchiveStore::open_existing(&config.database)
}

fn snapshot(config: &ArchiveConfig, args: &SnapshotArgs) -> Result<ExecutionOutcome> {
    let mut config = config.clone();
    let store = open_index(&mut config, &args.index)?;
    let patch = resolve_patch(&store, &args.dist, args.patch)?;
    let files = store.snapshot(&args.dist, patch)?;
    let message = format!("{} at patch {patch}: {} files", args.dist, files.len());
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "distribution": args.dist,
            "requested_patch": args.patch,
            "patch": patch,
            "files": files,
        }),
    ))
}

fn export(config: &ArchiveConfig, args: &ExportArgs) -> Result<ExecutionOutcome> {
    let mut config = config.clone();
    if let Some(root) = &args.root {
        config.root.clone_from(root);
    }
    let store = open_index(&mut config, &args.snapshot.index)?;
    let dist = &args.snapshot.dist;
    let patch = match args.snapshot.patch {
        Some(patch) => patch,
        None => resolve_patch(&store, dist, None)?,
    };
    let summary = export_snapshot(&store, &SystemFileSystem, &config.root, dist, patch, &args.out)
        .with_context(|| format!("failed to export {dist} into {}", args.out.display()))?;
    let message = format!(
        "wrote {} files ({} bytes) of {dist} patch {} to {}",
        summary.files,
        summary.bytes,
        summary.patch,
        args.out.display()
    );
    Ok(ExecutionOutcome::success(message, serde_json::to_value(&summary)?))
}

fn stats(config: &ArchiveConfig, args: &IndexArgs) -> Result<ExecutionOutcome> {
    let mut config = config.clone();
    let store = open_index(&mut config, args)?;
    let stats = store.stats()?;
    let message = format!(
        "{} blobs ({} bytes uncompressed, {} bytes embedded) in {}",
        stats.blobs,
        stats.uncompressed_bytes,
        stats.embedded_bytes,
        store.path().display()
    );
    let mut details = serde_json::to_value(&stats)?;
    details["backend"] = Value::String(store.backend().to_string());
    Ok(ExecutionOutcome::success(message, details))
}

fn show_config(config: &ArchiveConfig) -> Result<ExecutionOutcome> {
    let rendered =
        toml_edit::ser::to_string_pretty(config).context("failed to render configuration")?;
    Ok(ExecutionOutcome::success(
        rendered,
        json!({
            "passthrough": true,
            "config": serde_json::to_value(config)?,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_index_is_a_user_error() {
        let err = anyhow::Error::new(StoreError::MissingIndex(PathBuf::from("archive.sqlite")));
        let outcome = user_error_outcome(&err).expect("user error");
        assert_eq!(outcome.details["reason"], "missing_index");
        assert_eq!(outcome.details["hint"], "Run `archivist load` first.");
    }

    #[test]
    fn internal_store_errors_stay_failures() {
        let outcome = core_call(|| {
            Err(anyhow::Error::new(StoreError::UnknownBlob(
                archivist_core::domain::BlobId(9),
            )))
        });
        assert_eq!(outcome.status, crate::output::CommandStatus::Failure);
        assert_eq!(outcome.details["reason"], "internal_error");
    }
}
