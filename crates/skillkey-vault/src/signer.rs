//! Resolving the key a signing tool should use.
//!
//! An explicit override secret wins. Otherwise the keystore entry named by
//! the label is decrypted with the supplied password, and its address is
//! re-derived so an edited `address` field cannot go unnoticed.

use serde::Serialize;

use crate::error::{KeystoreError, Result};
use crate::keystore::{DEFAULT_LABEL, Keystore};
use crate::secret::SecretString;

/// Where a resolved signing key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerOrigin {
    Environment,
    Keystore,
}

impl std::fmt::Display for SignerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => f.write_str("environment"),
            Self::Keystore => f.write_str("keystore"),
        }
    }
}

/// Inputs to signer resolution, normally read from the environment once at
/// startup.
#[derive(Debug, Clone, Default)]
pub struct SignerSource {
    /// A raw private key that bypasses the keystore.
    pub override_secret: Option<SecretString>,
    /// Password for the keystore entry.
    pub password: Option<SecretString>,
    /// Entry label; [`DEFAULT_LABEL`] when unset.
    pub label: Option<String>,
}

impl SignerSource {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }
}

/// A resolved signing key.
#[derive(Debug, Clone)]
pub struct Signer {
    pub address: String,
    pub origin: SignerOrigin,
    pub secret: SecretString,
}

impl Keystore {
    /// Pick the signing key described by `source`.
    ///
    /// Returns `Ok(None)` when there is neither an override nor a password,
    /// or when a password is given but the keystore or the labeled entry
    /// does not exist.
    ///
    /// # Errors
    ///
    /// [`KeystoreError::InvalidSecret`] for a malformed override,
    /// any load/decrypt failure of an existing entry, and
    /// [`KeystoreError::AddressMismatch`] when the decrypted key does not
    /// produce the stored address.
    pub fn resolve_signer(&self, source: &SignerSource) -> Result<Option<Signer>> {
        if let Some(secret) = &source.override_secret {
            let address = self.deriver().address_of(secret.expose())?.to_checksum();
            tracing::debug!(address = %address, "using signer from environment");
            return Ok(Some(Signer {
                address,
                origin: SignerOrigin::Environment,
                secret: secret.clone(),
            }));
        }

        let Some(password) = &source.password else {
            return Ok(None);
        };
        if !self.file().exists() {
            tracing::debug!(path = %self.path().display(), "no keystore; no signer");
            return Ok(None);
        }

        let label = source.label();
        let doc = self.file().load()?;
        let Some(entry) = doc.find(label) else {
            tracing::debug!(label, "no keystore entry; no signer");
            return Ok(None);
        };

        let secret = crate::crypto::decrypt(&entry.payload, password)?;
        let derived = self.derive_from_decrypted(&secret)?;
        let stored: crate::address::Address = entry.address.parse()?;
        if stored != derived {
            return Err(KeystoreError::AddressMismatch {
                stored: entry.address.clone(),
                derived: derived.to_checksum(),
            });
        }

        tracing::debug!(label, address = %entry.address, "using signer from keystore");
        Ok(Some(Signer {
            address: entry.address.clone(),
            origin: SignerOrigin::Keystore,
            secret,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_file::SecureFile;
    use tempfile::TempDir;

    const SECRET: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
    const PASSWORD: &str = "correcthorsebattery";

    fn keystore(tmp: &TempDir) -> Keystore {
        Keystore::new(SecureFile::new(tmp.path()))
    }

    #[test]
    fn nothing_configured_means_no_signer() {
        let tmp = TempDir::new().unwrap();
        let signer = keystore(&tmp).resolve_signer(&SignerSource::default()).unwrap();
        assert!(signer.is_none());
    }

    #[test]
    fn override_wins_over_keystore() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        let source = SignerSource {
            override_secret: Some(SECRET.into()),
            password: Some(PASSWORD.into()),
            label: None,
        };
        let signer = ks.resolve_signer(&source).unwrap().unwrap();
        assert_eq!(signer.origin, SignerOrigin::Environment);
        assert_eq!(signer.address, ADDRESS);
        assert_eq!(signer.secret.expose(), SECRET);
    }

    #[test]
    fn malformed_override_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let source = SignerSource {
            override_secret: Some("0xnothex".into()),
            ..SignerSource::default()
        };
        let err = keystore(&tmp).resolve_signer(&source).unwrap_err();
        assert!(matches!(err, KeystoreError::InvalidSecret { .. }));
    }

    #[test]
    fn password_without_keystore_means_no_signer() {
        let tmp = TempDir::new().unwrap();
        let source = SignerSource {
            password: Some(PASSWORD.into()),
            ..SignerSource::default()
        };
        assert!(keystore(&tmp).resolve_signer(&source).unwrap().is_none());
    }

    #[test]
    fn keystore_entry_resolves_by_label() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password("ops", &SECRET.into(), &PASSWORD.into())
            .unwrap();

        let source = SignerSource {
            password: Some(PASSWORD.into()),
            label: Some("ops".into()),
            ..SignerSource::default()
        };
        let signer = ks.resolve_signer(&source).unwrap().unwrap();
        assert_eq!(signer.origin, SignerOrigin::Keystore);
        assert_eq!(signer.address, ADDRESS);

        // The default label is not present.
        let source = SignerSource {
            password: Some(PASSWORD.into()),
            ..SignerSource::default()
        };
        assert!(ks.resolve_signer(&source).unwrap().is_none());
    }

    #[test]
    fn wrong_password_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password(DEFAULT_LABEL, &SECRET.into(), &PASSWORD.into())
            .unwrap();

        let source = SignerSource {
            password: Some("not the password".into()),
            ..SignerSource::default()
        };
        let err = ks.resolve_signer(&source).unwrap_err();
        assert!(matches!(err, KeystoreError::DecryptionFailed));
    }

    #[test]
    fn edited_address_is_caught() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password(DEFAULT_LABEL, &SECRET.into(), &PASSWORD.into())
            .unwrap();

        let mut doc = ks.file().load().unwrap();
        doc.entries[0].address = "0x0000000000000000000000000000000000000001".into();
        ks.file().save(&doc).unwrap();

        let source = SignerSource {
            password: Some(PASSWORD.into()),
            ..SignerSource::default()
        };
        let err = ks.resolve_signer(&source).unwrap_err();
        assert!(matches!(err, KeystoreError::AddressMismatch { .. }));
    }

    #[test]
    fn origin_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(SignerOrigin::Keystore).unwrap(),
            serde_json::json!("keystore")
        );
        assert_eq!(SignerOrigin::Environment.to_string(), "environment");
    }
}
