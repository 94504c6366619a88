//! ebackup: encrypted backups of selected directories.
//!
//! Directories are grouped into categories in a TOML config file. A run sizes
//! the selected directories, checks that the output volume has room, writes a
//! gzip-compressed tar archive and encrypts it with GnuPG, either for a list
//! of recipients or under a passphrase.

pub mod archive;
pub mod capacity;
pub mod cli;
pub mod config;
mod constants;
pub mod encrypt;
pub mod error;
pub mod interrupt;
pub mod path;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod prompt;

pub use constants::EXIT_INTERRUPTED;
pub use error::{BackupError, Result};
