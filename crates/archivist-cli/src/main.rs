use clap::Parser;
use color_eyre::Result;

mod cli;
mod dispatch;
mod output;
mod style;

use cli::ArchivistCli;
use output::OutputOptions;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ArchivistCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let command = dispatch::command_name(&cli.command);
    let outcome = dispatch::dispatch_command(cli.config.as_deref(), &cli.command);
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = output::emit_output(&opts, command, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("archivist={level},archivist_core={level},archivist_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
