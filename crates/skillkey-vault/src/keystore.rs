//! Keystore entry operations: import, export, list, delete, verify.
//!
//! [`Keystore`] ties the [`SecureFile`] store, the cipher in
//! [`crate::crypto`] and an [`AddressDeriver`] together. Interactive input
//! comes from a [`Prompter`]; the password-taking `*_with_password` variants
//! are the non-interactive core the prompting wrappers call into.
//!
//! Every operation loads the document fresh, so schema validation runs on
//! each call. Mutations save the whole document only after the operation has
//! fully succeeded. There is no file locking: callers must not run two
//! operations against the same keystore concurrently.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::address::{Address, AddressDeriver, EvmAddressDeriver};
use crate::crypto;
use crate::document::{EntrySummary, KeystoreDocument, KeystoreEntry};
use crate::error::{KeystoreError, Result};
use crate::prompt::{Prompter, require_confirmation};
use crate::secret::SecretString;
use crate::secure_file::SecureFile;

/// Minimum password length for new entries, in characters.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Label used when the caller does not choose one.
pub const DEFAULT_LABEL: &str = "default";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub label: String,
    pub address: String,
    pub path: PathBuf,
}

/// Result of a confirmed export. Serializing it reveals the secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub label: String,
    pub address: String,
    #[serde(serialize_with = "serialize_secret")]
    pub secret: SecretString,
}

/// Metadata of every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReport {
    pub entries: Vec<EntrySummary>,
    pub path: PathBuf,
}

/// Result of a confirmed delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub label: String,
    pub remaining: usize,
}

/// Outcome of re-deriving an entry's address from its decrypted secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub label: String,
    pub stored_address: String,
    pub derived_address: String,
    #[serde(rename = "match")]
    pub matches: bool,
}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose())
}

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

/// Entry operations over one keystore file.
pub struct Keystore {
    file: SecureFile,
    deriver: Box<dyn AddressDeriver>,
}

impl Keystore {
    /// A keystore at `file` using EVM address derivation.
    pub fn new(file: SecureFile) -> Self {
        Self::with_deriver(file, Box::new(EvmAddressDeriver))
    }

    pub fn with_deriver(file: SecureFile, deriver: Box<dyn AddressDeriver>) -> Self {
        Self { file, deriver }
    }

    /// A keystore in `dir`, or in `~/.8004skill` when `dir` is `None`.
    pub fn open(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir,
            None => SecureFile::default_dir()?,
        };
        Ok(Self::new(SecureFile::new(dir)))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file(&self) -> &SecureFile {
        &self.file
    }

    pub fn deriver(&self) -> &dyn AddressDeriver {
        self.deriver.as_ref()
    }

    // -- Import -------------------------------------------------------------

    /// Prompt for a private key and a twice-entered password, then encrypt
    /// and store the key under `label`.
    ///
    /// The label is checked before anything is asked, and the key's shape is
    /// checked before the password is asked.
    pub fn import(&self, label: &str, prompter: &dyn Prompter) -> Result<ImportReport> {
        validate_label(label)?;
        let doc = self.load_or_new()?;
        if doc.find(label).is_some() {
            return Err(KeystoreError::DuplicateLabel {
                label: label.to_owned(),
            });
        }

        let secret = prompter.secret("Enter private key (0x-prefixed hex): ")?;
        self.deriver.address_of(secret.expose())?;

        let password = prompter.secret("Enter encryption password: ")?;
        check_password_strength(&password)?;
        let confirmation = prompter.secret("Confirm encryption password: ")?;
        if !password.matches(&confirmation) {
            return Err(KeystoreError::PasswordMismatch);
        }

        prompter.notice("Encrypting (this may take a moment)...");
        self.import_with_password(label, &secret, &password)
    }

    /// Encrypt `secret` under `password` and append it as `label`.
    ///
    /// # Errors
    ///
    /// [`KeystoreError::DuplicateLabel`] if the label exists (the document is
    /// left untouched), [`KeystoreError::InvalidSecret`] for a malformed key,
    /// [`KeystoreError::WeakPassword`] for a short password.
    pub fn import_with_password(
        &self,
        label: &str,
        secret: &SecretString,
        password: &SecretString,
    ) -> Result<ImportReport> {
        validate_label(label)?;
        let mut doc = self.load_or_new()?;
        if doc.find(label).is_some() {
            return Err(KeystoreError::DuplicateLabel {
                label: label.to_owned(),
            });
        }
        let address = self.deriver.address_of(secret.expose())?.to_checksum();
        check_password_strength(password)?;

        let payload = crypto::encrypt(secret, password)?;
        doc.entries.push(KeystoreEntry {
            payload,
            label: label.to_owned(),
            address: address.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        self.file.save(&doc)?;

        tracing::info!(label, address = %address, "imported keystore entry");
        Ok(ImportReport {
            label: label.to_owned(),
            address,
            path: self.file.path().to_path_buf(),
        })
    }

    // -- Export -------------------------------------------------------------

    /// After a typed confirmation and the password, reveal the secret stored
    /// under `label`.
    pub fn export(&self, label: &str, prompter: &dyn Prompter) -> Result<ExportReport> {
        let (doc, index) = self.load_entry(label)?;
        let entry = &doc.entries[index];

        prompter.notice("WARNING: This will display your private key in plaintext.");
        require_confirmation(prompter, "Type \"yes\" to continue: ", "export")?;

        let password = prompter.secret("Enter decryption password: ")?;
        let secret = crypto::decrypt(&entry.payload, &password)?;

        tracing::info!(label, "exported keystore entry");
        Ok(ExportReport {
            label: entry.label.clone(),
            address: entry.address.clone(),
            secret,
        })
    }

    // -- List ---------------------------------------------------------------

    /// Label, address and creation time of every entry. A missing keystore
    /// lists as empty. Never decrypts.
    pub fn list(&self) -> Result<ListReport> {
        let entries = if self.file.exists() {
            self.file.load()?.summaries()
        } else {
            Vec::new()
        };
        Ok(ListReport {
            entries,
            path: self.file.path().to_path_buf(),
        })
    }

    // -- Delete -------------------------------------------------------------

    /// After a typed confirmation, remove the first entry carrying `label`.
    pub fn delete(&self, label: &str, prompter: &dyn Prompter) -> Result<DeleteReport> {
        let (mut doc, index) = self.load_entry(label)?;

        prompter.notice(&format!(
            "About to delete entry \"{label}\" (address: {}).",
            doc.entries[index].address
        ));
        require_confirmation(prompter, "Type \"yes\" to confirm deletion: ", "delete")?;

        doc.entries.remove(index);
        self.file.save(&doc)?;

        tracing::info!(label, remaining = doc.entries.len(), "deleted keystore entry");
        Ok(DeleteReport {
            label: label.to_owned(),
            remaining: doc.entries.len(),
        })
    }

    // -- Verify -------------------------------------------------------------

    /// Prompt for the password and check the stored address against the one
    /// derived from the decrypted secret.
    pub fn verify(&self, label: &str, prompter: &dyn Prompter) -> Result<VerifyReport> {
        // Fail on a missing entry before asking for anything.
        self.load_entry(label)?;
        let password = prompter.secret("Enter decryption password: ")?;
        self.verify_with_password(label, &password)
    }

    /// Decrypt `label` with `password` and compare addresses.
    ///
    /// A mismatch is reported in the result, not as an error: it means the
    /// unauthenticated `address` field was edited.
    pub fn verify_with_password(&self, label: &str, password: &SecretString) -> Result<VerifyReport> {
        let (doc, index) = self.load_entry(label)?;
        let entry = &doc.entries[index];

        let secret = crypto::decrypt(&entry.payload, password)?;
        let derived = self.derive_from_decrypted(&secret)?;
        let stored: Address = entry.address.parse()?;
        let matches = stored == derived;

        if matches {
            tracing::debug!(label, "keystore entry verified");
        } else {
            tracing::warn!(label, stored = %entry.address, derived = %derived, "stored address does not match key");
        }

        Ok(VerifyReport {
            label: entry.label.clone(),
            stored_address: entry.address.clone(),
            derived_address: derived.to_checksum(),
            matches,
        })
    }

    // -- Internal helpers ---------------------------------------------------

    pub(crate) fn load_or_new(&self) -> Result<KeystoreDocument> {
        if self.file.exists() {
            self.file.load()
        } else {
            Ok(KeystoreDocument::new())
        }
    }

    /// Load the document and locate the first entry carrying `label`.
    pub(crate) fn load_entry(&self, label: &str) -> Result<(KeystoreDocument, usize)> {
        let doc = self.file.load()?;
        let index = doc
            .position(label)
            .ok_or_else(|| KeystoreError::EntryNotFound {
                label: label.to_owned(),
            })?;
        Ok((doc, index))
    }

    pub(crate) fn derive_from_decrypted(&self, secret: &SecretString) -> Result<Address> {
        self.deriver
            .address_of(secret.expose())
            .map_err(|_| KeystoreError::InvalidSecret {
                reason: "decrypted key is not a valid private key".into(),
            })
    }
}

fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(KeystoreError::InvalidLabel {
            reason: "label must not be empty".into(),
        });
    }
    Ok(())
}

fn check_password_strength(password: &SecretString) -> Result<()> {
    if password.char_count() < MIN_PASSWORD_LEN {
        return Err(KeystoreError::WeakPassword {
            min_len: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
