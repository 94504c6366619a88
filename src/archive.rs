//! Streaming tar.gz creation.

use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, trace};

use crate::error::{BackupError, Result};
use crate::probe::DirectoryEntry;
use crate::progress::{ProgressSink, ProgressUpdate, pad_label};

/// Default gzip compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Packs directories into a single archive written to `sink`.
pub trait Archiver {
    /// Adds each directory in order. Any failure aborts the whole archive.
    fn archive(
        &self,
        directories: &[DirectoryEntry],
        sink: &mut dyn Write,
        progress: &mut dyn ProgressSink,
    ) -> Result<()>;
}

/// Gzip-compressed tar archive; each directory is stored under its base name.
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    level: u32,
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level, clamped to 0-9.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }
}

impl Archiver for TarGzArchiver {
    fn archive(
        &self,
        directories: &[DirectoryEntry],
        sink: &mut dyn Write,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let width = directories
            .iter()
            .map(|d| label(&d.path).chars().count())
            .max()
            .unwrap_or(0);
        let total = directories.len();

        let encoder = GzEncoder::new(sink, Compression::new(self.level));
        let mut tar_builder = tar::Builder::new(encoder);
        tar_builder.follow_symlinks(false);

        progress.started(total);
        for (i, dir) in directories.iter().enumerate() {
            let name = base_name(&dir.path)?;
            debug!("Adding '{}' as '{}'", dir.path.display(), name.to_string_lossy());
            tar_builder
                .append_dir_all(name, &dir.path)
                .map_err(|e| BackupError::write_failure(&dir.path, e))?;
            trace!("Finished '{}'", dir.path.display());
            progress.directory_done(&ProgressUpdate {
                index: i + 1,
                total,
                label: pad_label(&label(&dir.path), width),
            });
        }

        let encoder = tar_builder
            .into_inner()
            .map_err(BackupError::flush_failure)?;
        let sink = encoder.finish().map_err(BackupError::flush_failure)?;
        sink.flush().map_err(BackupError::flush_failure)?;
        progress.finished();
        Ok(())
    }
}

fn label(path: &Path) -> String {
    path.display().to_string()
}

/// Last component of `path`; the archive never records the parents.
fn base_name(path: &Path) -> Result<&OsStr> {
    path.file_name().ok_or_else(|| BackupError::ArchiveWrite {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "directory has no base name to archive it under",
        ),
    })
}
