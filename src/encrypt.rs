//! Encryption of the finished archive through GnuPG.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info};
use zeroize::Zeroize;

use crate::error::{BackupError, Result};

/// Symmetric passphrase, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rejects passphrases gpg would cut short: it reads a single line from
    /// the passphrase fd.
    pub fn validate(&self) -> Result<()> {
        if self.0.contains(['\n', '\r']) {
            return Err(BackupError::InvalidPassphrase(
                "it must not contain line breaks".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// How the archive is encrypted.
#[derive(Debug, Clone)]
pub enum EncryptionMode {
    /// For the holders of the listed public keys.
    Recipients(Vec<String>),
    /// Under a shared passphrase.
    Symmetric(Passphrase),
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMode::Recipients(r) => write!(f, "recipients {}", r.join(", ")),
            EncryptionMode::Symmetric(_) => f.write_str("symmetric passphrase"),
        }
    }
}

/// Result of one call to the encryption engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOutcome {
    pub ok: bool,
    pub status: String,
    pub stderr: String,
}

impl EncryptionOutcome {
    fn from_output(output: &Output) -> Self {
        Self {
            ok: output.status.success(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Turns a failed outcome into [`BackupError::EncryptionFailure`].
    pub fn into_result(self) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            Err(BackupError::EncryptionFailure {
                status: self.status,
                stderr: self.stderr,
            })
        }
    }
}

/// External engine that turns the plaintext archive into ciphertext.
pub trait Encryptor {
    /// Checks, before any archiving, that `mode` can be honoured.
    fn preflight(&self, _mode: &EncryptionMode) -> Result<()> {
        Ok(())
    }

    /// Encrypts `input` into `output`. The output is binary, never armored.
    fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        mode: &EncryptionMode,
    ) -> Result<EncryptionOutcome>;
}

/// [`Encryptor`] that runs the `gpg` binary against a given home directory.
#[derive(Debug, Clone)]
pub struct GpgEncryptor {
    program: String,
    homedir: PathBuf,
    always_trust: bool,
}

impl GpgEncryptor {
    pub fn new(homedir: impl Into<PathBuf>) -> Self {
        Self {
            program: "gpg".to_string(),
            homedir: homedir.into(),
            always_trust: false,
        }
    }

    /// Uses another gpg-compatible program, e.g. `gpg2`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Skips the web-of-trust check for recipient keys.
    pub fn with_always_trust(mut self, always_trust: bool) -> Self {
        self.always_trust = always_trust;
        self
    }

    fn resolve_program(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|e| BackupError::EncryptorUnavailable {
            program: self.program.clone(),
            reason: e.to_string(),
        })
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("--homedir").arg(&self.homedir).arg("--batch");
        cmd
    }

    fn has_public_key(&self, program: &Path, recipient: &str) -> Result<bool> {
        let output = self
            .command(program)
            .args(["--list-keys", "--with-colons", "--"])
            .arg(recipient)
            .stdin(Stdio::null())
            .output()?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("gpg --list-keys {recipient}: {stderr}");
        classify_key_lookup(output.status.success(), output.status.code(), &stderr).map_err(
            |reason| BackupError::EncryptorUnavailable {
                program: self.program.clone(),
                reason,
            },
        )
    }

    /// Arguments for one encryption, without the program and homedir.
    fn encrypt_args(&self, input: &Path, output: &Path, mode: &EncryptionMode) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--yes".into(),
            "--no-armor".into(),
            "--output".into(),
            output.into(),
        ];
        match mode {
            EncryptionMode::Recipients(recipients) => {
                if self.always_trust {
                    args.extend(["--trust-model".into(), "always".into()]);
                }
                args.push("--encrypt".into());
                for r in recipients {
                    args.extend(["--recipient".into(), r.into()]);
                }
            }
            EncryptionMode::Symmetric(_) => {
                args.extend([
                    "--pinentry-mode".into(),
                    "loopback".into(),
                    "--passphrase-fd".into(),
                    "0".into(),
                    "--symmetric".into(),
                ]);
            }
        }
        args.push("--".into());
        args.push(input.into());
        args
    }
}

/// Markers gpg prints when the keyring itself cannot be used.
const KEYRING_FAILURES: [&str; 4] = [
    "keyblock resource",
    "No such file or directory",
    "Permission denied",
    "failed",
];

/// Interprets `gpg --list-keys`. Exit status 2 with a "No public key" and no
/// keyring complaints means the key is missing; anything else is a broken
/// keyring.
fn classify_key_lookup(
    success: bool,
    code: Option<i32>,
    stderr: &str,
) -> std::result::Result<bool, String> {
    if success {
        return Ok(true);
    }
    let keyring_broken = stderr
        .lines()
        .any(|line| KEYRING_FAILURES.iter().any(|m| line.contains(m)));
    let missing = stderr.is_empty() || stderr.contains("No public key");
    match code {
        Some(2) if missing && !keyring_broken => Ok(false),
        Some(code) => Err(format!("keyring lookup exited with {code}: {stderr}")),
        None => Err(format!("keyring lookup was killed: {stderr}")),
    }
}

impl Encryptor for GpgEncryptor {
    fn preflight(&self, mode: &EncryptionMode) -> Result<()> {
        let program = self.resolve_program()?;
        if !self.homedir.is_dir() {
            return Err(BackupError::EncryptorUnavailable {
                program: self.program.clone(),
                reason: format!("GnuPG home '{}' is not a directory", self.homedir.display()),
            });
        }
        if let EncryptionMode::Recipients(recipients) = mode {
            for recipient in recipients {
                if !self.has_public_key(&program, recipient)? {
                    return Err(BackupError::UnknownRecipient(recipient.clone()));
                }
            }
        }
        Ok(())
    }

    fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        mode: &EncryptionMode,
    ) -> Result<EncryptionOutcome> {
        if let EncryptionMode::Symmetric(passphrase) = mode {
            passphrase.validate()?;
        }
        let program = self.resolve_program()?;
        info!("Encrypting archive for {mode}");

        let mut cmd = self.command(&program);
        cmd.args(self.encrypt_args(input, output, mode))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match mode {
            EncryptionMode::Symmetric(passphrase) => {
                let mut child = cmd.stdin(Stdio::piped()).spawn()?;
                let written = match child.stdin.take() {
                    Some(mut stdin) => {
                        // gpg reads a single line from the passphrase fd.
                        let mut line = format!("{}\n", passphrase.expose());
                        let written = stdin.write_all(line.as_bytes());
                        line.zeroize();
                        written
                    }
                    None => Ok(()),
                };
                let output = child.wait_with_output()?;
                // An early gpg exit closes the pipe; its status tells why.
                match written {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e.into()),
                    _ => output,
                }
            }
            EncryptionMode::Recipients(_) => cmd.stdin(Stdio::null()).output()?,
        };

        let outcome = EncryptionOutcome::from_output(&output);
        debug!("gpg ok: {}, status: {}", outcome.ok, outcome.status);
        if !outcome.stderr.is_empty() {
            debug!("gpg stderr: {}", outcome.stderr);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpg() -> GpgEncryptor {
        GpgEncryptor::new("/home/alice/.gnupg")
    }

    #[test]
    fn test_passphrase_debug_is_redacted() {
        let p = Passphrase::new("hunter2");
        assert_eq!(format!("{p:?}"), "Passphrase(***)");
        assert_eq!(p.expose(), "hunter2");
        assert!(!p.is_empty());
    }

    #[test]
    fn test_recipient_args() {
        let mode = EncryptionMode::Recipients(vec!["alice@example.com".into(), "bob".into()]);
        let args = gpg().encrypt_args(Path::new("/tmp/in"), Path::new("/tmp/out"), &mode);
        assert_eq!(
            args,
            [
                "--yes",
                "--no-armor",
                "--output",
                "/tmp/out",
                "--encrypt",
                "--recipient",
                "alice@example.com",
                "--recipient",
                "bob",
                "--",
                "/tmp/in",
            ]
        );
    }

    #[test]
    fn test_recipient_args_always_trust() {
        let mode = EncryptionMode::Recipients(vec!["bob".into()]);
        let args = gpg()
            .with_always_trust(true)
            .encrypt_args(Path::new("in"), Path::new("out"), &mode);
        let pos = args.iter().position(|a| a == "--trust-model").unwrap();
        assert_eq!(args[pos + 1], "always");
    }

    #[test]
    fn test_symmetric_args_never_carry_the_passphrase() {
        let mode = EncryptionMode::Symmetric(Passphrase::new("s3cret"));
        let args = gpg().encrypt_args(Path::new("in"), Path::new("out"), &mode);
        assert!(args.iter().any(|a| a == "--symmetric"));
        assert!(args.iter().any(|a| a == "--no-armor"));
        assert!(!args.iter().any(|a| a == "--encrypt"));
        assert!(!args.iter().any(|a| a == "--armor"));
        assert!(args.iter().all(|a| !a.to_string_lossy().contains("s3cret")));
    }

    #[cfg(unix)]
    #[test]
    fn test_args_keep_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let input = Path::new(OsStr::from_bytes(b"/tmp/caf\xe9/in.tar.gz"));
        let output = Path::new(OsStr::from_bytes(b"/tmp/caf\xe9/out.gpg"));
        let mode = EncryptionMode::Symmetric(Passphrase::new("x"));
        let args = gpg().encrypt_args(input, output, &mode);
        assert_eq!(args[3], output.as_os_str());
        assert_eq!(args.last().unwrap(), input.as_os_str());
    }

    #[test]
    fn test_passphrase_with_line_break_is_rejected() {
        assert!(Passphrase::new("correct horse").validate().is_ok());
        for secret in ["abc\nxyz", "abc\r", "\r\n"] {
            assert!(matches!(
                Passphrase::new(secret).validate(),
                Err(BackupError::InvalidPassphrase(_))
            ));
        }
    }

    #[test]
    fn test_encrypt_refuses_multiline_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let mode = EncryptionMode::Symmetric(Passphrase::new("abc\nxyz"));
        let err = GpgEncryptor::new(dir.path())
            .encrypt(&dir.path().join("in"), &dir.path().join("out"), &mode)
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidPassphrase(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_key_lookup_missing_key() {
        let stderr = "gpg: keybox '/tmp/h/pubring.kbx' created\n\
                      gpg: error reading key: No public key";
        assert_eq!(classify_key_lookup(false, Some(2), stderr), Ok(false));
        assert_eq!(classify_key_lookup(false, Some(2), ""), Ok(false));
        assert_eq!(classify_key_lookup(true, Some(0), ""), Ok(true));
    }

    #[test]
    fn test_key_lookup_broken_keyring() {
        let stderr = "gpg: keyblock resource '/x/pubring.kbx': Permission denied\n\
                      gpg: error reading key: No public key";
        assert!(classify_key_lookup(false, Some(2), stderr).is_err());
        let fatal = "gpg: fatal: can't create directory";
        assert!(classify_key_lookup(false, Some(2), fatal).is_err());
        assert!(classify_key_lookup(false, None, "").is_err());
    }

    #[test]
    fn test_missing_homedir_is_unavailable() {
        let Ok(_) = which::which("gpg") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let mode = EncryptionMode::Recipients(vec!["bob".into()]);
        let err = GpgEncryptor::new(dir.path().join("absent"))
            .preflight(&mode)
            .unwrap_err();
        assert!(matches!(err, BackupError::EncryptorUnavailable { .. }));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let encryptor = gpg().with_program("definitely-not-a-gpg-binary");
        let err = encryptor
            .preflight(&EncryptionMode::Symmetric(Passphrase::new("x")))
            .unwrap_err();
        assert!(matches!(err, BackupError::EncryptorUnavailable { .. }));
    }

    #[test]
    fn test_failed_outcome_is_fatal() {
        let outcome = EncryptionOutcome {
            ok: false,
            status: "exit status: 2".into(),
            stderr: "gpg: encryption failed".into(),
        };
        match outcome.into_result() {
            Err(BackupError::EncryptionFailure { stderr, .. }) => {
                assert_eq!(stderr, "gpg: encryption failed")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_mode_display_hides_passphrase() {
        let mode = EncryptionMode::Symmetric(Passphrase::new("s3cret"));
        assert_eq!(mode.to_string(), "symmetric passphrase");
        let mode = EncryptionMode::Recipients(vec!["a".into(), "b".into()]);
        assert_eq!(mode.to_string(), "recipients a, b");
    }
}
