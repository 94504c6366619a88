#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Path to a usable `gpg`, or `None` when the tests should be skipped.
pub fn gpg() -> Option<PathBuf> {
    which::which("gpg").ok()
}

/// Runs gpg against `home` in batch mode.
pub fn gpg_cmd(gpg: &Path, home: &Path) -> Command {
    let mut cmd = Command::new(gpg);
    cmd.arg("--homedir")
        .arg(home)
        .arg("--batch")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// Checks that symmetric encryption works in `home` at all; some sandboxes
/// cannot start gpg-agent.
pub fn symmetric_works(gpg: &Path, home: &Path) -> bool {
    let probe = home.join("probe.txt");
    if fs::write(&probe, b"probe").is_err() {
        return false;
    }
    let ok = gpg_cmd(gpg, home)
        .args(["--yes", "--pinentry-mode", "loopback", "--passphrase", "probe"])
        .arg("--output")
        .arg(home.join("probe.gpg"))
        .arg("--symmetric")
        .arg(&probe)
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    let _ = fs::remove_file(&probe);
    let _ = fs::remove_file(home.join("probe.gpg"));
    ok
}

/// Generates an unprotected key for `uid` in `home`.
pub fn generate_key(gpg: &Path, home: &Path, uid: &str) -> bool {
    gpg_cmd(gpg, home)
        .args(["--pinentry-mode", "loopback", "--passphrase", ""])
        .args(["--quick-gen-key", uid, "default", "default", "never"])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Decrypts `input` into `output` with `passphrase`, bypassing the agent cache.
pub fn decrypt_symmetric(
    gpg: &Path,
    home: &Path,
    input: &Path,
    output: &Path,
    passphrase: &str,
) -> bool {
    gpg_cmd(gpg, home)
        .args(["--yes", "--no-symkey-cache", "--pinentry-mode", "loopback"])
        .args(["--passphrase", passphrase])
        .arg("--output")
        .arg(output)
        .arg("--decrypt")
        .arg(input)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Decrypts `input` with the secret keys in `home`.
pub fn decrypt_with_keyring(gpg: &Path, home: &Path, input: &Path, output: &Path) -> bool {
    gpg_cmd(gpg, home)
        .args(["--yes", "--pinentry-mode", "loopback", "--passphrase", ""])
        .arg("--output")
        .arg(output)
        .arg("--decrypt")
        .arg(input)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Writes a config with one `critical` category holding `dirs`.
pub fn write_config(path: &Path, gnupghome: &Path, recipients: &[&str], dirs: &[&Path]) {
    let recipients = recipients
        .iter()
        .map(|r| format!("\"{r}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let dirs = dirs
        .iter()
        .map(|d| format!("\"{}\"", d.display()))
        .collect::<Vec<_>>()
        .join(", ");
    let body = format!(
        "[settings]\nrecipients = [{recipients}]\ngnupghome = \"{}\"\nalways_trust = true\n\n[directories]\ncritical = [{dirs}]\n",
        gnupghome.display()
    );
    fs::write(path, body).unwrap();
}
