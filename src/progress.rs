//! Progress reporting while directories are archived.

use indicatif::{ProgressBar, ProgressStyle};

/// Emitted once a directory has been fully added to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Number of directories archived so far, starting at 1.
    pub index: usize,
    pub total: usize,
    /// Directory label padded to the longest label of the run.
    pub label: String,
}

/// Receives archiving progress.
pub trait ProgressSink {
    fn started(&mut self, _total: usize) {}
    fn directory_done(&mut self, update: &ProgressUpdate);
    fn finished(&mut self) {}
}

/// Discards every update.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn directory_done(&mut self, _update: &ProgressUpdate) {}
}

/// Console progress bar drawn on stderr.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl ProgressSink for ConsoleProgress {
    fn started(&mut self, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "Progress: [{bar:10.cyan/blue}] {pos}/{len} {percent}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        self.bar = Some(bar);
    }

    fn directory_done(&mut self, update: &ProgressUpdate) {
        if let Some(bar) = &self.bar {
            bar.set_position(update.index as u64);
            bar.set_message(update.label.clone());
        }
    }

    fn finished(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message("");
        }
    }
}

/// Pads `label` with spaces to `width` characters.
pub fn pad_label(label: &str, width: usize) -> String {
    format!("{label:<width$}")
}
