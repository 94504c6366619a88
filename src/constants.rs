/// Package name.
pub(crate) const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub(crate) const CONFIG_NAME: &str = "config.toml";
/// Extension of the final encrypted backup.
pub(crate) const BACKUP_EXTENSION: &str = "tar.gz.gpg";
/// Environment variable read instead of prompting for the symmetric passphrase.
pub(crate) const PASSPHRASE_ENV: &str = "EBACKUP_PASSPHRASE";
/// Exit status after an operator interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;
