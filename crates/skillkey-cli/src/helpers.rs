//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, JSON output, error reporting and
//! environment variable utilities.

use std::collections::BTreeMap;

use serde::Serialize;
use skillkey_vault::{KeystoreError, SecretString, SignerSource};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr; stdout is reserved for the JSON result.
pub fn init_tracing(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A subscriber may already be installed (tests run several commands in
    // one process); the first one stays.
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-line JSON describing a failed command.
pub fn error_json(err: &anyhow::Error) -> String {
    let code = err
        .downcast_ref::<KeystoreError>()
        .map(KeystoreError::code)
        .unwrap_or("internal");
    serde_json::json!({ "error": format!("{err:#}"), "code": code }).to_string()
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Names of the environment variables the CLI reads.
pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ENV_PASSWORD: &str = "KEYSTORE_PASSWORD";
pub const ENV_LABEL: &str = "KEYSTORE_LABEL";
pub const ENV_HOME: &str = "SKILLKEY_HOME";

/// Read an environment variable, returning `None` if unset or empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Signer-related environment, read once at startup.
#[derive(Debug, Default)]
pub struct Environment {
    pub private_key: Option<SecretString>,
    pub password: Option<SecretString>,
    pub label: Option<String>,
    pub home_set: bool,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            private_key: env_non_empty(ENV_PRIVATE_KEY).map(SecretString::new),
            password: env_non_empty(ENV_PASSWORD).map(SecretString::new),
            label: env_non_empty(ENV_LABEL),
            home_set: env_non_empty(ENV_HOME).is_some(),
        }
    }

    /// Inputs for signer resolution, with `default_label` when no label is set.
    pub fn signer_source(&self, default_label: &str) -> SignerSource {
        SignerSource {
            override_secret: self.private_key.clone(),
            password: self.password.clone(),
            label: Some(
                self.label
                    .clone()
                    .unwrap_or_else(|| default_label.to_owned()),
            ),
        }
    }

    /// Which variables are set. Values are never reported.
    pub fn flags(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            (ENV_PRIVATE_KEY, self.private_key.is_some()),
            (ENV_PASSWORD, self.password.is_some()),
            (ENV_LABEL, self.label.is_some()),
            (ENV_HOME, self.home_set),
        ])
    }
}
