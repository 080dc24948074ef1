//! CLI argument definitions for skillkey.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// skillkey -- password-encrypted keystore for signing keys.
#[derive(Parser)]
#[command(
    name = "skillkey",
    version,
    about = "skillkey -- password-encrypted keystore for signing keys",
    long_about = "Stores private keys in ~/.8004skill/keystore.json, each encrypted with \
                  AES-256-GCM under a PBKDF2-derived key. Results are printed as JSON on \
                  stdout; errors as one-line JSON on stderr."
)]
pub struct Cli {
    /// Keystore directory (defaults to ~/.8004skill).
    #[arg(long, global = true, env = "SKILLKEY_HOME")]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encrypt and store a private key (prompts for key and password).
    Import {
        /// Entry label; the configured default label when omitted.
        #[arg(long, short)]
        label: Option<String>,
    },

    /// Decrypt and print a stored private key after confirmation.
    Export {
        #[arg(long, short)]
        label: String,
    },

    /// List stored entries without decrypting anything.
    List,

    /// Remove an entry after confirmation.
    Delete {
        #[arg(long, short)]
        label: String,
    },

    /// Decrypt an entry and check its stored address.
    Verify {
        #[arg(long, short)]
        label: String,
    },

    /// Report keystore health, signer resolution and environment.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn import_label_is_optional() {
        let cli = Cli::try_parse_from(["skillkey", "import"]).unwrap();
        assert!(matches!(cli.command, Commands::Import { label: None }));

        let cli = Cli::try_parse_from(["skillkey", "import", "--label", "ops"]).unwrap();
        assert!(matches!(cli.command, Commands::Import { label: Some(ref l) } if l == "ops"));
    }

    #[test]
    fn export_requires_label() {
        assert!(Cli::try_parse_from(["skillkey", "export"]).is_err());
        let cli = Cli::try_parse_from(["skillkey", "export", "-l", "ops"]).unwrap();
        assert!(matches!(cli.command, Commands::Export { ref label } if label == "ops"));
    }

    #[test]
    fn home_flag_is_global() {
        let cli = Cli::try_parse_from(["skillkey", "list", "--home", "/tmp/ks"]).unwrap();
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/ks")));
    }
}
