//! Keystore error types.
//!
//! Every keystore subsystem surfaces errors through [`KeystoreError`], the
//! single error type returned by the public API of this crate. Variants carry
//! the field names and observed values a user needs to act on the failure,
//! but never a password or a decrypted secret.

use std::path::PathBuf;

/// Unified error type for the skillkey keystore.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    // -- File store errors --------------------------------------------------
    /// No keystore file exists at the expected location.
    #[error("no keystore found at {}", .path.display())]
    KeystoreNotFound { path: PathBuf },

    /// The keystore path (or its directory) is a symbolic link.
    #[error("refusing to operate on symlink: {}", .path.display())]
    SymlinkRefused { path: PathBuf },

    /// The keystore file is readable by other users or owned by someone else.
    #[error("insecure keystore file {}: {detail}", .path.display())]
    InsecurePermissions { path: PathBuf, detail: String },

    // -- Document errors ----------------------------------------------------
    /// The keystore file is not valid JSON.
    #[error("keystore is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// The keystore JSON does not match the supported schema.
    ///
    /// `index` is `None` when the failure is at document level.
    #[error("invalid keystore{}: \"{field}\" {detail}", .index.map(|i| format!(" entry at index {i}")).unwrap_or_default())]
    SchemaInvalid {
        index: Option<usize>,
        field: String,
        detail: String,
    },

    /// No entry carries the requested label.
    #[error("no entry with label \"{label}\"")]
    EntryNotFound { label: String },

    /// An entry with this label already exists.
    #[error("entry \"{label}\" already exists; delete it first or choose a different label")]
    DuplicateLabel { label: String },

    // -- Input errors -------------------------------------------------------
    /// The label is empty or otherwise unusable.
    #[error("invalid label: {reason}")]
    InvalidLabel { reason: String },

    /// The chosen password is shorter than the required minimum.
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },

    /// The confirmation password differs from the first entry.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// The supplied secret is not a well-formed private key.
    #[error("invalid private key: {reason}")]
    InvalidSecret { reason: String },

    /// The user declined a confirmation prompt.
    #[error("{operation} cancelled")]
    UserCancelled { operation: &'static str },

    /// Reading from the prompt failed.
    #[error("failed to read input: {0}")]
    Prompt(#[source] std::io::Error),

    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (RNG or `ring` internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Wrong password or corrupted entry. Deliberately carries no detail.
    #[error("decryption failed: wrong password or corrupted entry")]
    DecryptionFailed,

    /// A stored cipher/KDF parameter is weaker than or different from the
    /// expected value.
    #[error("{field} {observed} does not satisfy expected {expected}; keystore may be tampered")]
    TamperSuspected {
        field: &'static str,
        expected: String,
        observed: String,
    },

    /// The address derived from a decrypted secret differs from the stored one.
    #[error("stored address {stored} does not match derived address {derived}")]
    AddressMismatch { stored: String, derived: String },

    // -- Underlying errors --------------------------------------------------
    /// JSON serialization error while writing the keystore.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeystoreError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeystoreNotFound { .. } | Self::EntryNotFound { .. } => "not_found",
            Self::SymlinkRefused { .. } => "symlink_refused",
            Self::InsecurePermissions { .. } => "insecure_permissions",
            Self::MalformedJson(_) => "malformed_json",
            Self::SchemaInvalid { .. } => "schema_invalid",
            Self::DuplicateLabel { .. } => "duplicate_label",
            Self::InvalidLabel { .. } => "invalid_label",
            Self::WeakPassword { .. } => "weak_password",
            Self::PasswordMismatch => "password_mismatch",
            Self::InvalidSecret { .. } => "invalid_secret",
            Self::UserCancelled { .. } => "user_cancelled",
            Self::Prompt(_) => "prompt_failed",
            Self::EncryptionFailed { .. } => "encryption_failed",
            Self::DecryptionFailed => "decryption_failed",
            Self::TamperSuspected { .. } => "tamper_suspected",
            Self::AddressMismatch { .. } => "address_mismatch",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    pub(crate) fn schema(index: Option<usize>, field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaInvalid {
            index,
            field: field.into(),
            detail: detail.into(),
        }
    }
}

/// Convenience alias used throughout the keystore crate.
pub type Result<T> = std::result::Result<T, KeystoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_message_names_index_and_field() {
        let err = KeystoreError::schema(Some(3), "address", "is not a valid address");
        assert_eq!(
            err.to_string(),
            "invalid keystore entry at index 3: \"address\" is not a valid address"
        );
        assert_eq!(err.code(), "schema_invalid");
    }

    #[test]
    fn document_level_schema_message_has_no_index() {
        let err = KeystoreError::schema(None, "version", "must be 1, got 2");
        assert_eq!(err.to_string(), "invalid keystore: \"version\" must be 1, got 2");
    }

    #[test]
    fn tamper_message_reports_observed_and_expected() {
        let err = KeystoreError::TamperSuspected {
            field: "kdfParams.iterations",
            expected: ">= 262144".into(),
            observed: "1000".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("kdfParams.iterations"));
        assert!(msg.contains("1000"));
        assert!(msg.contains(">= 262144"));
    }
}
