//! Removal of transient files when the operator interrupts a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// Paths that must not survive the process. Cloned handles share one list.
#[derive(Debug, Clone, Default)]
pub struct Cleanup {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, path: &Path) {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        paths.push(path.to_path_buf());
    }

    pub fn untrack(&self, path: &Path) {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        paths.retain(|p| p != path);
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Best-effort removal of every tracked path.
    pub fn purge(&self) {
        let paths: Vec<PathBuf> = {
            let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
            paths.drain(..).collect()
        };
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove '{}': {e}", path.display());
                }
            }
        }
    }

    /// Purges tracked files and exits with `code` on Ctrl-C.
    pub fn install_handler(&self, code: i32) -> Result<(), ctrlc::Error> {
        let cleanup = self.clone();
        ctrlc::set_handler(move || {
            eprintln!("Interrupted by user.");
            cleanup.purge();
            std::process::exit(code);
        })
    }
}
