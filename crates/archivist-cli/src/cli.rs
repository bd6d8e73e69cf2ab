use std::path::PathBuf;

use archivist_core::domain::DistributionCode;
use archivist_core::BackendKind;
use clap::{value_parser, ArgAction, Args, Parser, Subcommand};

pub const ARCHIVIST_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const ARCHIVIST_BEFORE_HELP: &str = concat!(
    "archivist ",
    env!("CARGO_PKG_VERSION"),
    " – Patch archive indexer\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  load             Index the original client, every distribution, then carry-forward.\n",
    "  snapshot         List a distribution's files as of a patch.\n",
    "  export           Rebuild a distribution's client directory as of a patch.\n",
    "  stats            Summarise blobs and memberships in the index.\n",
    "  config           Print the resolved archive layout.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "archivist",
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = ARCHIVIST_BEFORE_HELP,
    help_template = ARCHIVIST_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct ArchivistCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        env = "ARCHIVIST_CONFIG",
        help = "Archive layout file (defaults to the built-in layout)",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Index the archive: original baseline, distributions, then carry-forward.",
        override_usage = "archivist load [--root DIR] [--database PATH] [--backend KIND]"
    )]
    Load(LoadArgs),
    #[command(
        about = "List every file of a distribution as of a patch.",
        override_usage = "archivist snapshot --dist CODE [--patch N]"
    )]
    Snapshot(SnapshotArgs),
    #[command(
        about = "Write a distribution's client tree as of a patch to a directory.",
        override_usage = "archivist export --dist CODE [--patch N] --out DIR"
    )]
    Export(ExportArgs),
    #[command(about = "Summarise stored blobs and per-distribution memberships (read-only).")]
    Stats(IndexArgs),
    #[command(about = "Print the resolved archive layout, including environment overrides.")]
    Config,
}

/// Overrides shared by every command that touches the index.
#[derive(Args, Debug, Default)]
pub struct IndexArgs {
    #[arg(long, value_name = "PATH", help = "Index database to use")]
    pub database: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub index: IndexArgs,
    #[arg(long, value_name = "DIR", help = "Archive root the layout paths resolve against")]
    pub root: Option<PathBuf>,
    #[arg(
        long,
        value_name = "KIND",
        value_parser = parse_backend,
        help = "Blob storage for new indexes: embedded or external"
    )]
    pub backend: Option<BackendKind>,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub index: IndexArgs,
    #[arg(
        long,
        value_name = "CODE",
        value_parser = parse_distribution,
        help = "Distribution code (e.g. us)"
    )]
    pub dist: DistributionCode,
    #[arg(
        long,
        value_name = "N",
        value_parser = value_parser!(u16),
        help = "Patch to view (defaults to the latest; lower patches resolve downward)"
    )]
    pub patch: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,
    #[arg(long, value_name = "DIR", help = "Destination directory")]
    pub out: PathBuf,
    #[arg(long, value_name = "DIR", help = "Archive root for externally stored blobs")]
    pub root: Option<PathBuf>,
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    value.parse::<BackendKind>().map_err(|err| err.to_string())
}

fn parse_distribution(value: &str) -> Result<DistributionCode, String> {
    value.parse::<DistributionCode>().map_err(|err| err.to_string())
}
