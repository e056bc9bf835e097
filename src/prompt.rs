//! Interactive confirmation and passphrase entry.

use crate::error::{Error, Result};
use std::io::{self, BufRead, Write};
use zeroize::Zeroizing;

/// Asks the operator before and during decryption.
pub trait Prompter {
    /// Should `volume` be decrypted?
    fn confirm(&self, volume: &str) -> Result<bool>;

    /// Read the passphrase for `volume` without echoing it.
    fn passphrase(&self, volume: &str) -> Result<Zeroizing<String>>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, _volume: &str) -> Result<bool> {
        eprint!("Decrypt? ([y],n): ");
        io::stderr().flush()?;

        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer)?;
        if read == 0 {
            return Err(Error::Prompt("standard input closed".to_string()));
        }
        Ok(is_affirmative(&answer))
    }

    fn passphrase(&self, _volume: &str) -> Result<Zeroizing<String>> {
        rpassword::prompt_password("Enter passphrase: ")
            .map(Zeroizing::new)
            .map_err(|e| Error::Prompt(e.to_string()))
    }
}

/// Answers every confirmation with yes; passphrases still come from `inner`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm<P> {
    inner: P,
}

impl<P: Prompter> AutoConfirm<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Prompter> Prompter for AutoConfirm<P> {
    fn confirm(&self, _volume: &str) -> Result<bool> {
        Ok(true)
    }

    fn passphrase(&self, volume: &str) -> Result<Zeroizing<String>> {
        self.inner.passphrase(volume)
    }
}

/// Empty input defaults to yes, matching the `[y]` hint.
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
