use std::env;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use path_clean::PathClean;

use crate::constants::BACKUP_EXTENSION;

/// Expands a path, replacing a leading `~` or `$HOME` with the user's home
/// directory, and makes it absolute relative to the current directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let path = expand_home(path);

    let abs_path = if path.is_absolute() {
        path
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path,
        }
    };
    abs_path.clean()
}

/// Replaces a leading `~` or `$HOME` component. The rest of the path is kept
/// as is, including bytes that are not valid UTF-8.
fn expand_home(path: &Path) -> PathBuf {
    let rest = path
        .strip_prefix("~")
        .or_else(|_| path.strip_prefix("$HOME"));
    match (rest, dirs::home_dir()) {
        (Ok(rest), Some(home)) if rest.as_os_str().is_empty() => home,
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Name of the dated backup file, e.g. `backup-2024-05-01.tar.gz.gpg`.
pub fn dated_file_name(date: NaiveDate) -> String {
    format!("backup-{}.{BACKUP_EXTENSION}", date.format("%Y-%m-%d"))
}

/// Resolves where the encrypted backup is written.
///
/// * no output given: a dated file in the system temporary directory
/// * an existing directory: a dated file inside it
/// * anything else: used as the file name itself
pub fn resolve_output(output: Option<&Path>, date: NaiveDate) -> PathBuf {
    match output {
        None => env::temp_dir().join(dated_file_name(date)),
        Some(path) => {
            let path = expand_path(path);
            if path.is_dir() {
                path.join(dated_file_name(date))
            } else {
                path
            }
        }
    }
}

/// Directory that will hold `file`; the free-space check and the transient
/// artifacts both live there.
pub fn output_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
