//! One backup run: sizing, capacity pre-flight, archiving, encryption and
//! cleanup, in that order.
//!
//! The plaintext archive and the ciphertext are written to hidden temporary
//! files next to the requested output. The plaintext is removed as soon as
//! the encryption attempt returns, successful or not, and the ciphertext is
//! renamed onto the output path only once encryption succeeded.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::archive::Archiver;
use crate::capacity::{FreeSpace, FsFreeSpace, check_free_space};
use crate::encrypt::{EncryptionMode, Encryptor};
use crate::error::{BackupError, Result};
use crate::interrupt::Cleanup;
use crate::path::output_dir;
use crate::probe::{DirectoryEntry, human_size, probe_directories, total_size};
use crate::progress::ProgressSink;

/// Everything a run needs, resolved once from the command line and config.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub directories: Vec<PathBuf>,
    pub output: PathBuf,
    pub mode: EncryptionMode,
    /// An existing output may be replaced, because of `-y` or the operator's
    /// answer. Without it a run refuses to start when the output exists.
    pub overwrite: bool,
}

/// Progress of a run. Each stage is reached only if the previous one succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SizingComplete,
    CapacityVerified,
    Archived,
    Encrypted,
    Cleaned,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::SizingComplete => "sizing complete",
            Stage::CapacityVerified => "capacity verified",
            Stage::Archived => "archived",
            Stage::Encrypted => "encrypted",
            Stage::Cleaned => "cleaned",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub output: PathBuf,
    pub directories: Vec<DirectoryEntry>,
    pub total_size: u64,
    pub archive_size: u64,
    pub encrypted_size: u64,
}

/// A temporary file that is removed unless it is persisted.
struct Transient {
    path: Option<TempPath>,
    cleanup: Cleanup,
}

impl Transient {
    /// Creates an empty hidden sibling of `output` in `dir`.
    fn create(
        dir: &Path,
        output: &Path,
        suffix: &str,
        cleanup: &Cleanup,
    ) -> Result<(File, Self)> {
        let mut prefix = OsString::from(".");
        prefix.push(output.file_name().unwrap_or_else(|| OsStr::new("backup")));
        prefix.push(".");
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(suffix)
            .tempfile_in(dir)?;
        let (file, path) = file.into_parts();
        // The name is only known once the file exists, so an interrupt
        // landing right here leaves it behind.
        cleanup.track(&path);
        Ok((
            file,
            Self {
                path: Some(path),
                cleanup: cleanup.clone(),
            },
        ))
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    fn remove(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => {
                self.cleanup.untrack(&path);
                path.close()
            }
            None => Ok(()),
        }
    }

    /// Removes the file, logging instead of failing.
    fn discard(self) {
        let path = self.path().to_path_buf();
        if let Err(e) = self.remove() {
            warn!("Could not remove temporary file '{}': {e}", path.display());
        }
    }

    fn persist(mut self, to: &Path) -> io::Result<()> {
        match self.path.take() {
            Some(path) => {
                self.cleanup.untrack(&path);
                path.persist(to).map_err(|e| e.error)
            }
            None => Ok(()),
        }
    }
}

impl Drop for Transient {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.cleanup.untrack(&path);
        }
    }
}

/// The plaintext archive awaiting encryption.
struct ArchiveArtifact {
    file: Transient,
    size: u64,
}

/// Runs backups with the given collaborators.
pub struct Backup {
    archiver: Box<dyn Archiver>,
    encryptor: Box<dyn Encryptor>,
    free_space: Box<dyn FreeSpace>,
    cleanup: Cleanup,
    stage: Stage,
}

impl Backup {
    pub fn new(archiver: impl Archiver + 'static, encryptor: impl Encryptor + 'static) -> Self {
        Self {
            archiver: Box::new(archiver),
            encryptor: Box::new(encryptor),
            free_space: Box::new(FsFreeSpace),
            cleanup: Cleanup::new(),
            stage: Stage::Idle,
        }
    }

    pub fn with_free_space(mut self, free_space: impl FreeSpace + 'static) -> Self {
        self.free_space = Box::new(free_space);
        self
    }

    /// Shares the registry of transient files, e.g. with an interrupt handler.
    pub fn with_cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Executes `request`, returning a report on success. On failure every
    /// transient file has been removed and the output path is untouched.
    pub fn run(
        &mut self,
        request: &BackupRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<BackupReport> {
        self.stage = Stage::Idle;
        let result = self.execute(request, progress);
        if let Err(e) = &result {
            debug!("Backup aborted after stage '{}': {e}", self.stage);
            self.stage = Stage::Aborted;
        }
        result
    }

    fn advance(&mut self, stage: Stage) {
        debug!("Stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn execute(
        &mut self,
        request: &BackupRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<BackupReport> {
        if !request.overwrite && request.output.exists() {
            return Err(BackupError::Aborted(format!(
                "'{}' exists and replacing it was not confirmed.",
                request.output.display()
            )));
        }
        self.encryptor.preflight(&request.mode)?;

        let entries = probe_directories(&request.directories)?;
        let total = total_size(&entries);
        self.advance(Stage::SizingComplete);

        let dir = output_dir(&request.output);
        check_free_space(total, &dir, self.free_space.as_ref())?;
        self.advance(Stage::CapacityVerified);

        info!(
            "Archiving {} directories with total size of {}.",
            entries.len(),
            human_size(total)
        );
        let artifact = self.build_archive(&entries, &dir, &request.output, progress)?;
        info!(
            "Archiving complete. Resulting filesize: {}.",
            human_size(artifact.size)
        );
        self.advance(Stage::Archived);

        let archive_size = artifact.size;
        self.encrypt(artifact, &dir, request)?;

        let encrypted_size = fs::metadata(&request.output)?.len();
        info!(
            "Encryption complete. Resulting filesize: {}.",
            human_size(encrypted_size)
        );
        Ok(BackupReport {
            output: request.output.clone(),
            directories: entries,
            total_size: total,
            archive_size,
            encrypted_size,
        })
    }

    fn build_archive(
        &self,
        entries: &[DirectoryEntry],
        dir: &Path,
        output: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<ArchiveArtifact> {
        let (file, staged) = Transient::create(dir, output, ".tar.gz.tmp", &self.cleanup)?;
        debug!("Writing plaintext archive to '{}'", staged.path().display());

        match write_archive(self.archiver.as_ref(), entries, file, progress) {
            Ok(size) => Ok(ArchiveArtifact { file: staged, size }),
            Err(e) => {
                staged.discard();
                Err(e)
            }
        }
    }

    fn encrypt(
        &mut self,
        artifact: ArchiveArtifact,
        dir: &Path,
        request: &BackupRequest,
    ) -> Result<()> {
        let created = Transient::create(dir, &request.output, ".partial", &self.cleanup);
        let ciphertext = match created {
            Ok((_, ciphertext)) => ciphertext,
            Err(e) => {
                artifact.file.discard();
                return Err(e);
            }
        };

        let outcome = self
            .encryptor
            .encrypt(artifact.file.path(), ciphertext.path(), &request.mode);

        info!("Deleting temporary file '{}'.", artifact.file.path().display());
        artifact.file.discard();

        match outcome.and_then(|outcome| outcome.into_result()) {
            Ok(()) => self.advance(Stage::Encrypted),
            Err(e) => {
                ciphertext.discard();
                return Err(e);
            }
        }

        ciphertext.persist(&request.output)?;
        self.advance(Stage::Cleaned);
        Ok(())
    }
}

fn write_archive(
    archiver: &dyn Archiver,
    entries: &[DirectoryEntry],
    file: File,
    progress: &mut dyn ProgressSink,
) -> Result<u64> {
    let mut writer = BufWriter::new(file);
    archiver.archive(entries, &mut writer, progress)?;
    let file = writer
        .into_inner()
        .map_err(|e| BackupError::flush_failure(e.into_error()))?;
    file.sync_all().map_err(BackupError::flush_failure)?;
    Ok(file.metadata()?.len())
}
