use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use ebackup::cli::{self, Cli};
use ebackup::interrupt::Cleanup;
use ebackup::prompt::TerminalPrompter;
use ebackup::{BackupError, EXIT_INTERRUPTED};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<BackupError>() {
            // A fresh template is not a failure; the operator only has to fill it in.
            Some(err @ BackupError::ConfigMissing { .. }) => {
                eprintln!("{err}");
                ExitCode::from(err.exit_code())
            }
            Some(err) => {
                eprintln!("error: {err}");
                ExitCode::from(err.exit_code())
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let cleanup = Cleanup::new();
    cleanup
        .install_handler(EXIT_INTERRUPTED)
        .context("failed to install the interrupt handler")?;
    cli::run(cli, &mut TerminalPrompter, &cleanup)?;
    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
