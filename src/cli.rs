//! Command-line interface definition for ebackup.
//!
//! This module defines the command-line flags and turns them, together with
//! the config file, into a [`BackupRequest`] that is then executed.

use std::env;
use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use tracing::info;

use crate::archive::TarGzArchiver;
use crate::config::{self, CRITICAL, Config, IMPORTANT, NON_ESSENTIAL};
use crate::constants::PASSPHRASE_ENV;
use crate::encrypt::{EncryptionMode, GpgEncryptor, Passphrase};
use crate::error::{BackupError, Result};
use crate::interrupt::Cleanup;
use crate::path::resolve_output;
use crate::pipeline::{Backup, BackupReport, BackupRequest};
use crate::progress::{ConsoleProgress, NoProgress, ProgressSink};
use crate::prompt::{Prompter, confirm_overwrite, read_confirmed_passphrase};

/// Create an encrypted backup of the configured directories.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Include the critical directories.
    #[arg(short, long)]
    pub critical: bool,
    /// Include the important directories.
    #[arg(short, long)]
    pub important: bool,
    /// Include the non-essential directories.
    #[arg(short, long)]
    pub nonessential: bool,
    /// Include the directories of another config category. Repeatable.
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,
    /// Use symmetric encryption with a passphrase instead of the recipients.
    #[arg(short, long)]
    pub symmetric: bool,
    /// Answer yes to every question.
    #[arg(short, long)]
    pub yes: bool,
    /// File or directory for the archive. Default: <tmp>/backup-<date>.tar.gz.gpg
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
    /// Config file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Only log errors and hide the progress bar.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Category names in the order their directories are archived.
    pub fn selected_categories(&self) -> Vec<String> {
        let mut selected: Vec<String> = [
            (self.critical, CRITICAL),
            (self.important, IMPORTANT),
            (self.nonessential, NON_ESSENTIAL),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| name.to_string())
        .collect();
        for category in &self.categories {
            if !selected.contains(category) {
                selected.push(category.clone());
            }
        }
        selected
    }

    pub fn config_file(&self) -> PathBuf {
        self.config
            .as_deref()
            .map(crate::path::expand_path)
            .unwrap_or_else(config::default_config_file)
    }
}

/// Loads the config and turns the flags into a validated request, asking the
/// operator whatever is still needed.
pub fn resolve_request(cli: &Cli, prompter: &mut dyn Prompter) -> Result<(BackupRequest, Config)> {
    let output = resolve_output(cli.output.as_deref(), Local::now().date_naive());
    let config = Config::load(&cli.config_file())?;

    let directories = config.select(&cli.selected_categories())?;
    config::check_directories(&directories)?;

    // Only an output that exists now has been confirmed; one appearing later
    // is replaced only with `-y`.
    let exists = output.exists();
    if exists && !cli.yes {
        confirm_overwrite(prompter, &output)?;
    }
    let overwrite = cli.yes || exists;
    info!("Using filename '{}'.", output.display());

    let mode = if cli.symmetric {
        EncryptionMode::Symmetric(symmetric_passphrase(prompter)?)
    } else {
        if config.settings.recipients.is_empty() {
            return Err(BackupError::ConfigMalformed {
                path: cli.config_file(),
                reason: "no recipients configured; add some or use --symmetric".to_string(),
            });
        }
        EncryptionMode::Recipients(config.settings.recipients.clone())
    };

    let request = BackupRequest {
        directories,
        output,
        mode,
        overwrite,
    };
    Ok((request, config))
}

fn symmetric_passphrase(prompter: &mut dyn Prompter) -> Result<Passphrase> {
    match env::var(PASSPHRASE_ENV) {
        Ok(secret) if !secret.is_empty() => {
            let passphrase = Passphrase::new(secret);
            passphrase.validate().map_err(|_| {
                BackupError::InvalidPassphrase(format!("{PASSPHRASE_ENV} contains a line break"))
            })?;
            info!("Using passphrase from {PASSPHRASE_ENV}.");
            Ok(passphrase)
        }
        _ => read_confirmed_passphrase(prompter),
    }
}

/// Runs one backup as described by `cli`.
pub fn run(cli: &Cli, prompter: &mut dyn Prompter, cleanup: &Cleanup) -> Result<BackupReport> {
    let (request, config) = resolve_request(cli, prompter)?;

    let encryptor = GpgEncryptor::new(&config.settings.gnupghome)
        .with_always_trust(config.settings.always_trust);
    let mut backup =
        Backup::new(TarGzArchiver::new(), encryptor).with_cleanup(cleanup.clone());

    let mut progress: Box<dyn ProgressSink> = if cli.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(ConsoleProgress::new())
    };
    let report = backup.run(&request, progress.as_mut())?;
    info!("Backup '{}' complete.", report.output.display());
    Ok(report)
}
