//! CLI entry point for skillkey.
//!
//! This binary provides the `skillkey` command with subcommands for
//! importing, exporting, listing, deleting and verifying keystore entries.
//! Results are printed as JSON on stdout. Failures print a one-line JSON
//! error on stderr and exit with status 1.

mod cli;
mod config;
mod helpers;
mod prompt;
mod status;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use skillkey_vault::Keystore;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::helpers::{Environment, error_json, init_tracing, print_json};
use crate::prompt::TerminalPrompter;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Load .env before clap reads SKILLKEY_HOME. A missing file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    finish(run(cli), &mut io::stderr())
}

/// Map a command outcome to the exit status, reporting a failure as one
/// line of JSON on `stderr`.
fn finish(result: Result<()>, stderr: &mut impl Write) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(stderr, "{}", error_json(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let keystore = Keystore::open(cli.home)?;
    let config = config::load_config(keystore.file().dir());
    init_tracing(&config.log_level, config.log_format);

    let env = Environment::from_process();
    tracing::debug!(path = %keystore.path().display(), "using keystore");

    match cli.command {
        Commands::Import { label } => cmd_import(&keystore, &config, label),
        Commands::Export { label } => {
            let report = keystore.export(&label, &TerminalPrompter)?;
            print_json(&report)
        }
        Commands::List => print_json(&keystore.list()?),
        Commands::Delete { label } => print_json(&keystore.delete(&label, &TerminalPrompter)?),
        Commands::Verify { label } => print_json(&keystore.verify(&label, &TerminalPrompter)?),
        Commands::Status => {
            let source = env.signer_source(&config.default_label);
            let report = status::collect(&keystore, &source, env.flags());
            print_json(&report)
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: import
// ---------------------------------------------------------------------------

fn cmd_import(keystore: &Keystore, config: &Config, label: Option<String>) -> Result<()> {
    let label = label.unwrap_or_else(|| config.default_label.clone());

    let report = keystore
        .import(&label, &TerminalPrompter)
        .with_context(|| format!("import of \"{label}\" failed"))?;
    print_json(&report)
}
