//! Local encrypted keystore for EVM signing keys.
//!
//! Private keys are stored in a single JSON document under
//! `~/.8004skill/keystore.json`, one labeled entry per key. Each entry is
//! encrypted with AES-256-GCM under a key derived from a per-entry password
//! with PBKDF2-HMAC-SHA256. The file is written atomically with owner-only
//! permissions and is never read or written through a symlink.
//!
//! # Modules
//!
//! - [`crypto`] — AES-256-GCM sealing, PBKDF2 derivation, tamper checks.
//! - [`document`] — keystore JSON schema and validation.
//! - [`secure_file`] — symlink-refusing, permission-checked file access.
//! - [`keystore`] — import, export, list, delete and verify.
//! - [`signer`] — choosing the signing key for other tools.
//! - [`address`] — private key to checksummed address derivation.
//! - [`prompt`] — injectable interactive input.
//! - [`secret`] — zeroizing string wrapper.
//! - [`error`] — unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use skillkey_vault::{Keystore, SecretString, SecureFile};
//!
//! # fn example() -> skillkey_vault::Result<()> {
//! let keystore = Keystore::new(SecureFile::new("/tmp/skillkey"));
//!
//! let secret = SecretString::from("0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318");
//! let password = SecretString::from("correcthorsebattery");
//! let imported = keystore.import_with_password("default", &secret, &password)?;
//!
//! let report = keystore.verify_with_password("default", &password)?;
//! assert!(report.matches);
//! assert_eq!(report.derived_address, imported.address);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod crypto;
pub mod document;
pub mod error;
pub mod keystore;
pub mod prompt;
pub mod secret;
pub mod secure_file;
pub mod signer;

// Re-export the most commonly used types at the crate root for convenience.
pub use address::{Address, AddressDeriver, EvmAddressDeriver};
pub use document::{EntrySummary, KeystoreDocument, KeystoreEntry};
pub use error::{KeystoreError, Result};
pub use keystore::{
    DEFAULT_LABEL, DeleteReport, ExportReport, ImportReport, Keystore, ListReport,
    MIN_PASSWORD_LEN, VerifyReport,
};
pub use prompt::{Prompter, ScriptedPrompter};
pub use secret::SecretString;
pub use secure_file::SecureFile;
pub use signer::{Signer, SignerOrigin, SignerSource};
