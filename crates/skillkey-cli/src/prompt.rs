//! Terminal-backed [`Prompter`].
//!
//! Hidden input goes through `rpassword`, which reads from the controlling
//! terminal. Visible answers are read from stdin. Prompts and notices go to
//! stderr so stdout carries only the JSON result.

use std::io::{self, BufRead, Write};

use skillkey_vault::{KeystoreError, Prompter, SecretString};

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn secret(&self, prompt: &str) -> skillkey_vault::Result<SecretString> {
        rpassword::prompt_password(prompt)
            .map(SecretString::new)
            .map_err(KeystoreError::Prompt)
    }

    fn line(&self, prompt: &str) -> skillkey_vault::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}").map_err(KeystoreError::Prompt)?;
        stderr.flush().map_err(KeystoreError::Prompt)?;

        let mut answer = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(KeystoreError::Prompt)?;
        if read == 0 {
            return Err(KeystoreError::Prompt(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed",
            )));
        }
        Ok(answer)
    }

    fn notice(&self, message: &str) {
        eprintln!("{message}");
    }
}
