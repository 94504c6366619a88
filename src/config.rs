//! Configuration for this application.
//!
//! The config file maps directory categories to lists of paths and holds the
//! GnuPG settings. A missing file is replaced by a template that
//! the operator fills in before the next run.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{CONFIG_NAME, PKG_NAME};
use crate::error::{BackupError, Result};
use crate::path::expand_path;

/// Category selected by `--critical`.
pub const CRITICAL: &str = "critical";
/// Category selected by `--important`.
pub const IMPORTANT: &str = "important";
/// Category selected by `--nonessential`.
pub const NON_ESSENTIAL: &str = "non_essential";

/// The persisted configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: Settings,
    /// Category name to the directories it backs up.
    #[serde(default)]
    pub directories: BTreeMap<String, Vec<PathBuf>>,
}

/// GnuPG settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Key identifiers used in recipient mode.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// GnuPG home directory holding the keyring.
    pub gnupghome: PathBuf,
    /// Encrypt for recipients even when their keys are not certified.
    #[serde(default)]
    pub always_trust: bool,
}

impl Config {
    /// Example configuration written when none exists.
    pub fn template() -> Self {
        let mut directories = BTreeMap::new();
        directories.insert(
            CRITICAL.to_string(),
            vec![
                PathBuf::from("~/.password-store"),
                PathBuf::from("~/.gnupg"),
            ],
        );
        directories.insert(
            IMPORTANT.to_string(),
            vec![PathBuf::from("~/Pictures"), PathBuf::from("~/Documents")],
        );
        directories.insert(
            NON_ESSENTIAL.to_string(),
            vec![
                PathBuf::from("/mnt/hdd/large-files"),
                PathBuf::from("/mnt/hdd/movies"),
            ],
        );
        Self {
            settings: Settings {
                recipients: vec!["user@email.com".to_string()],
                gnupghome: PathBuf::from("~/.gnupg"),
                always_trust: false,
            },
            directories,
        }
    }

    /// Loads and validates the config at `path`.
    ///
    /// If the file does not exist the template is written there and
    /// [`BackupError::ConfigMissing`] is returned.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::template().write(path)?;
            info!("Created config template at '{}'", path.display());
            return Err(BackupError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }
        let toml_str = fs::read_to_string(path)?;
        let config = Self::parse(&toml_str, path)?;
        debug!(
            "Loaded config with {} categories from '{}'",
            config.directories.len(),
            path.display()
        );
        Ok(config)
    }

    fn parse(toml_str: &str, path: &Path) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_str).map_err(|e| BackupError::ConfigMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if config.settings.gnupghome.as_os_str().is_empty() {
            return Err(BackupError::ConfigMalformed {
                path: path.to_path_buf(),
                reason: "gnupghome not set".to_string(),
            });
        }
        config.settings.gnupghome = expand_path(&config.settings.gnupghome);
        for dirs in config.directories.values_mut() {
            for dir in dirs.iter_mut() {
                *dir = expand_path(dir);
            }
        }
        Ok(config)
    }

    /// Writes the configuration in TOML format, creating the parent directory
    /// if it does not exist.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self).map_err(|e| {
            BackupError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        let file = fs::File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        writer.write_all(toml_str.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Directories of the given categories, in category order then config order.
    /// A path listed more than once is kept at its first position only.
    pub fn select<S: AsRef<str>>(&self, categories: &[S]) -> Result<Vec<PathBuf>> {
        let mut selected: Vec<PathBuf> = vec![];
        for category in categories {
            let name = category.as_ref();
            let dirs = self
                .directories
                .get(name)
                .ok_or_else(|| BackupError::UnknownCategory {
                    name: name.to_string(),
                    available: self.category_names(),
                })?;
            for dir in dirs {
                if !selected.contains(dir) {
                    selected.push(dir.clone());
                }
            }
        }
        if selected.is_empty() {
            return Err(BackupError::NoDirectoriesSelected);
        }
        Ok(selected)
    }

    fn category_names(&self) -> String {
        self.directories
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Fails with every path in `dirs` that does not exist.
pub fn check_directories(dirs: &[PathBuf]) -> Result<()> {
    let missing: Vec<PathBuf> = dirs.iter().filter(|d| !d.exists()).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BackupError::MissingDirectories(missing))
    }
}

/// Returns the absolute path to the default configuration file.
pub fn default_config_file() -> PathBuf {
    config_dir().join(CONFIG_NAME)
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PKG_NAME)
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PKG_NAME)
}
