//! Interactive input as an injectable capability.
//!
//! Keystore operations never touch the terminal directly. They ask a
//! [`Prompter`] for hidden secrets and visible confirmation lines; the CLI
//! supplies a terminal-backed implementation and tests supply
//! [`ScriptedPrompter`].

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use crate::error::{KeystoreError, Result};
use crate::secret::SecretString;

/// The literal a user must type to confirm a destructive or revealing action.
pub const CONFIRMATION_WORD: &str = "yes";

/// Source of user input.
pub trait Prompter {
    /// Read a value without echoing it.
    fn secret(&self, prompt: &str) -> Result<SecretString>;

    /// Read a visible line of text.
    fn line(&self, prompt: &str) -> Result<String>;

    /// Print a notice to the user (not to the result stream).
    fn notice(&self, message: &str);
}

/// Ask for the confirmation word; anything else cancels `operation`.
pub fn require_confirmation(
    prompter: &dyn Prompter,
    prompt: &str,
    operation: &'static str,
) -> Result<()> {
    let answer = prompter.line(prompt)?;
    if answer.trim().eq_ignore_ascii_case(CONFIRMATION_WORD) {
        Ok(())
    } else {
        tracing::debug!(operation, "confirmation declined");
        Err(KeystoreError::UserCancelled { operation })
    }
}

/// A prompter that replays canned answers in order.
///
/// Running out of answers yields an `UnexpectedEof` prompt error. Every
/// prompt string is recorded so tests can assert on the conversation.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Prompts shown so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or_default()
    }

    fn next(&self, prompt: &str) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(prompt.to_owned());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .ok_or_else(|| {
                KeystoreError::Prompt(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "no scripted answer left",
                ))
            })
    }
}

impl Prompter for ScriptedPrompter {
    fn secret(&self, prompt: &str) -> Result<SecretString> {
        self.next(prompt).map(SecretString::new)
    }

    fn line(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn notice(&self, _message: &str) {}
}
