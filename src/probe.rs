//! Size accounting for the directories about to be archived.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};

/// A directory selected for backup with its recursively computed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Sums the sizes of all regular files under `root`.
///
/// Symbolic links are neither followed nor counted, matching what the
/// archiver stores for them.
pub fn directory_size(root: &Path) -> Result<u64> {
    if !root.exists() {
        return Err(BackupError::PathNotFound(root.to_path_buf()));
    }
    let mut total = 0u64;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| BackupError::Io(e.into()))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(|e| BackupError::Io(e.into()))?.len();
        }
    }
    Ok(total)
}

/// Probes every directory in order.
pub fn probe_directories(dirs: &[PathBuf]) -> Result<Vec<DirectoryEntry>> {
    dirs.iter()
        .map(|path| {
            let size = directory_size(path)?;
            debug!("{} holds {}", path.display(), human_size(size));
            Ok(DirectoryEntry {
                path: path.clone(),
                size,
            })
        })
        .collect()
}

/// Total size of all entries.
pub fn total_size(entries: &[DirectoryEntry]) -> u64 {
    entries.iter().map(|e| e.size).sum()
}

/// Renders a byte count with binary units, e.g. `1.5 KiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{num:.1} {unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1} YiB")
}
