//! `skillkey status`: keystore health, signer resolution and environment.
//!
//! Never prints secret material. A keystore that fails to load is reported
//! in the output instead of failing the command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use skillkey_vault::secure_file::ownership_problem;
use skillkey_vault::{Keystore, SignerOrigin, SignerSource};

use crate::config::CONFIG_FILE_NAME;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub version: &'static str,
    pub signer_address: Option<String>,
    pub signer_origin: Option<SignerOrigin>,
    pub signer_error: Option<String>,
    pub keystore: KeystoreStatus,
    pub env_vars: BTreeMap<&'static str, bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreStatus {
    pub exists: bool,
    pub path: PathBuf,
    pub entry_count: usize,
    pub entries: Vec<EntryBrief>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntryBrief {
    pub label: String,
    pub address: String,
}

/// Collect the status report.
pub fn collect(
    keystore: &Keystore,
    source: &SignerSource,
    env_vars: BTreeMap<&'static str, bool>,
) -> StatusReport {
    let exists = keystore.file().exists();
    let mut entries = Vec::new();
    let mut load_error = None;

    if exists {
        match keystore.file().load() {
            Ok(doc) => {
                entries = doc
                    .entries
                    .into_iter()
                    .map(|e| EntryBrief {
                        label: e.label,
                        address: e.address,
                    })
                    .collect();
            }
            Err(e) => {
                tracing::warn!(error = %e, "keystore failed to load");
                load_error = Some(e.to_string());
            }
        }
    }

    // A broken keystore is already reported above; only the override can
    // still produce a signer.
    let (signer_address, signer_origin, signer_error) =
        if load_error.is_some() && source.override_secret.is_none() {
            (None, None, None)
        } else {
            match keystore.resolve_signer(source) {
                Ok(Some(signer)) => (Some(signer.address), Some(signer.origin), None),
                Ok(None) => (None, None, None),
                Err(e) => (None, None, Some(e.to_string())),
            }
        };

    let mut warnings = keystore.file().inspect();
    let config_path = keystore.file().dir().join(CONFIG_FILE_NAME);
    if let Some(problem) = ownership_problem(&config_path) {
        warnings.push(format!(
            "Config file {}: {problem}. Run: chmod 600 {}",
            config_path.display(),
            config_path.display()
        ));
    }

    StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        signer_address,
        signer_origin,
        signer_error,
        keystore: KeystoreStatus {
            exists,
            path: keystore.path().to_path_buf(),
            entry_count: entries.len(),
            entries,
            error: load_error,
        },
        env_vars,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillkey_vault::SecureFile;
    use tempfile::TempDir;

    const SECRET: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
    const PASSWORD: &str = "correcthorsebattery";

    fn keystore(tmp: &TempDir) -> Keystore {
        Keystore::new(SecureFile::new(tmp.path().join("ks")))
    }

    #[test]
    fn empty_environment_reports_nothing() {
        let tmp = TempDir::new().unwrap();
        let report = collect(&keystore(&tmp), &SignerSource::default(), BTreeMap::new());
        assert!(!report.keystore.exists);
        assert_eq!(report.keystore.entry_count, 0);
        assert!(report.signer_address.is_none());
        assert!(report.signer_error.is_none());
    }

    #[test]
    fn keystore_signer_is_resolved_without_leaking_secret() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password("default", &SECRET.into(), &PASSWORD.into())
            .unwrap();

        let source = SignerSource {
            password: Some(PASSWORD.into()),
            ..SignerSource::default()
        };
        let report = collect(&ks, &source, BTreeMap::new());
        assert_eq!(report.signer_address.as_deref(), Some(ADDRESS));
        assert_eq!(report.signer_origin, Some(SignerOrigin::Keystore));
        assert_eq!(report.keystore.entry_count, 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains(&SECRET[2..]));
        assert!(!json.contains(PASSWORD));
        assert!(json.contains("\"signerOrigin\":\"keystore\""));
    }

    #[test]
    fn wrong_password_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password("default", &SECRET.into(), &PASSWORD.into())
            .unwrap();

        let source = SignerSource {
            password: Some("definitely wrong".into()),
            ..SignerSource::default()
        };
        let report = collect(&ks, &source, BTreeMap::new());
        assert!(report.signer_address.is_none());
        assert!(report.signer_error.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn broken_keystore_is_reported_in_output() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let ks = keystore(&tmp);
        ks.import_with_password("default", &SECRET.into(), &PASSWORD.into())
            .unwrap();
        std::fs::write(ks.path(), "{ not json").unwrap();
        std::fs::set_permissions(ks.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let source = SignerSource {
            password: Some(PASSWORD.into()),
            ..SignerSource::default()
        };
        let report = collect(&ks, &source, BTreeMap::new());
        assert!(report.keystore.exists);
        assert!(report.keystore.error.is_some());
        assert!(report.signer_error.is_none());
    }
}
