//! Error type shared by every stage of a backup run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Unified result type for all fallible operations in ebackup.
pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    /// No configuration existed; a template was written in its place.
    #[error(
        "No configuration file found. An example '{}' has been created.\n\
         Please fill it with your configuration settings and then run ebk again.",
        .path.display()
    )]
    ConfigMissing { path: PathBuf },

    #[error("Config file '{}' is malformed: {reason}", .path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    #[error("Unknown directory category '{name}'. Available categories: {available}")]
    UnknownCategory { name: String, available: String },

    #[error("No directories selected. Pass at least one of --critical, --important, --nonessential or --category")]
    NoDirectoriesSelected,

    #[error("The following directories do not exist:\n{}", display_paths(.0))]
    MissingDirectories(Vec<PathBuf>),

    #[error("The path '{}' does not exist", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not enough free space: {required} bytes required, {available} bytes available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("Ran out of disk space while writing the archive")]
    OutOfSpace,

    #[error("Failed to archive '{}': {source}", .path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Recipient '{0}' was not found in the keyring")]
    UnknownRecipient(String),

    #[error("Encryption program '{program}' is unavailable: {reason}")]
    EncryptorUnavailable { program: String, reason: String },

    #[error("Encryption failed ({status}):\n{stderr}")]
    EncryptionFailure { status: String, stderr: String },

    #[error("Passphrase rejected: {0}")]
    InvalidPassphrase(String),

    #[error("Passphrases do not match")]
    PassphraseMismatch,

    #[error("{0}")]
    Aborted(String),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackupError {
    /// Process exit status for this error. A freshly generated config template
    /// is not a failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::ConfigMissing { .. } => 0,
            _ => 1,
        }
    }

    /// Wraps an I/O error raised while archiving `path`, singling out a full disk.
    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: io::Error) -> Self {
        if is_out_of_space(&source) {
            BackupError::OutOfSpace
        } else {
            BackupError::ArchiveWrite {
                path: path.into(),
                source,
            }
        }
    }

    /// Wraps an I/O error raised while flushing the archive itself.
    pub(crate) fn flush_failure(source: io::Error) -> Self {
        if is_out_of_space(&source) {
            BackupError::OutOfSpace
        } else {
            BackupError::Io(source)
        }
    }
}

impl From<dialoguer::Error> for BackupError {
    fn from(e: dialoguer::Error) -> Self {
        BackupError::Prompt(e.to_string())
    }
}

fn is_out_of_space(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::StorageFull
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
