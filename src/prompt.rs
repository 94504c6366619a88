//! Interactive questions asked before a backup starts.

use std::path::Path;

use dialoguer::{Confirm, Password};

use crate::encrypt::Passphrase;
use crate::error::{BackupError, Result};

/// Source of operator answers.
pub trait Prompter {
    /// Reads a secret without echoing it.
    fn secret(&mut self, prompt: &str) -> Result<String>;
    /// Asks a yes/no question; the default answer is no.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
    /// Shows a short message to the operator.
    fn notify(&mut self, message: &str);
}

/// [`Prompter`] reading from the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn secret(&mut self, prompt: &str) -> Result<String> {
        let secret = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(secret)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = Confirm::new().with_prompt(prompt).default(false).interact()?;
        Ok(answer)
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// Checks that both entries are identical.
pub fn confirm_passphrase(first: String, second: String) -> Result<Passphrase> {
    let first = Passphrase::new(first);
    let second = Passphrase::new(second);
    if first == second {
        Ok(first)
    } else {
        Err(BackupError::PassphraseMismatch)
    }
}

/// Asks for the passphrase twice until both entries match, are non-empty and
/// fit on one line. There is no retry limit.
pub fn read_confirmed_passphrase(prompter: &mut dyn Prompter) -> Result<Passphrase> {
    loop {
        let first = prompter.secret("Passphrase to use")?;
        let second = prompter.secret("Re-type your passphrase")?;
        match confirm_passphrase(first, second) {
            Ok(passphrase) if passphrase.is_empty() => {
                prompter.notify("Passphrase must not be empty.");
            }
            Ok(passphrase) if passphrase.validate().is_err() => {
                prompter.notify("Passphrase must not contain line breaks.");
            }
            Ok(passphrase) => {
                prompter.notify("Passphrases match.");
                return Ok(passphrase);
            }
            Err(BackupError::PassphraseMismatch) => {
                prompter.notify("Passphrases do not match.");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Asks whether an existing output file may be replaced.
pub fn confirm_overwrite(prompter: &mut dyn Prompter, output: &Path) -> Result<()> {
    let prompt = format!("File '{}' exists. Overwrite?", output.display());
    if prompter.confirm(&prompt)? {
        Ok(())
    } else {
        Err(BackupError::Aborted("Aborting.".to_string()))
    }
}
