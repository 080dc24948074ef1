//! On-disk keystore schema and its validation.
//!
//! The keystore file is attacker-influenceable, so it is never deserialized
//! straight into the typed model. [`validate`] walks the raw JSON value,
//! checks every field of every entry, and only then builds a
//! [`KeystoreDocument`]. The first failure is reported with the entry index
//! and field name.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": [
//!     {
//!       "cipher": "aes-256-gcm",
//!       "kdf": "pbkdf2",
//!       "kdfParams": { "iterations": 262144, "digest": "sha256", "salt": "…", "keyLength": 32 },
//!       "ciphertext": "…",
//!       "iv": "…",
//!       "authTag": "…",
//!       "label": "default",
//!       "address": "0x…",
//!       "createdAt": "2026-01-01T00:00:00.000Z"
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address;
use crate::crypto::{EncryptedPayload, KdfParams};
use crate::error::{KeystoreError, Result};

/// The only schema version this crate reads or writes.
pub const KEYSTORE_VERSION: u64 = 1;

static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2})+$").expect("hex pattern is valid"));

const STRING_FIELDS: [&str; 8] = [
    "label",
    "address",
    "cipher",
    "kdf",
    "ciphertext",
    "iv",
    "authTag",
    "createdAt",
];

const HEX_FIELDS: [&str; 3] = ["ciphertext", "iv", "authTag"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A labeled, encrypted private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreEntry {
    #[serde(flatten)]
    pub payload: EncryptedPayload,
    pub label: String,
    /// `0x` + 40 hex digits. Not covered by the AEAD tag.
    pub address: String,
    /// ISO-8601, informational only.
    pub created_at: String,
}

/// Label, address and creation time of an entry; no cipher material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub label: String,
    pub address: String,
    pub created_at: String,
}

/// The whole keystore file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreDocument {
    pub version: u64,
    pub entries: Vec<KeystoreEntry>,
}

impl Default for KeystoreDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystoreDocument {
    /// An empty document at the current version.
    pub fn new() -> Self {
        Self {
            version: KEYSTORE_VERSION,
            entries: Vec::new(),
        }
    }

    /// Parse and validate raw file content.
    ///
    /// # Errors
    ///
    /// [`KeystoreError::MalformedJson`] if `raw` is not JSON, otherwise any
    /// error from [`validate`].
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(KeystoreError::MalformedJson)?;
        validate(&value)
    }

    /// Index of the first entry carrying `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.label == label)
    }

    /// The first entry carrying `label`.
    pub fn find(&self, label: &str) -> Option<&KeystoreEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Summaries of all entries in insertion order.
    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries
            .iter()
            .map(|e| EntrySummary {
                label: e.label.clone(),
                address: e.address.clone(),
                created_at: e.created_at.clone(),
            })
            .collect()
    }

    /// Labels that appear on more than one entry, in first-seen order.
    pub fn duplicate_labels(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for entry in &self.entries {
            if !seen.insert(entry.label.as_str()) && !dups.contains(&entry.label.as_str()) {
                dups.push(entry.label.as_str());
            }
        }
        dups
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_hex(s: &str) -> bool {
    HEX_RE.is_match(s)
}

/// Validate an untyped JSON value and build the typed document from it.
///
/// # Errors
///
/// [`KeystoreError::SchemaInvalid`] naming the first offending field.
pub fn validate(raw: &Value) -> Result<KeystoreDocument> {
    let obj = raw
        .as_object()
        .ok_or_else(|| KeystoreError::schema(None, "(root)", "is not an object"))?;

    match obj.get("version").and_then(Value::as_u64) {
        Some(KEYSTORE_VERSION) => {}
        _ => {
            let observed = obj
                .get("version")
                .map(Value::to_string)
                .unwrap_or_else(|| "missing".into());
            return Err(KeystoreError::schema(
                None,
                "version",
                format!("unsupported version {observed}, expected {KEYSTORE_VERSION}"),
            ));
        }
    }

    let raw_entries = obj
        .get("entries")
        .and_then(Value::as_array)
        .ok_or_else(|| KeystoreError::schema(None, "entries", "is not an array"))?;

    let entries = raw_entries
        .iter()
        .enumerate()
        .map(|(i, e)| validate_entry(i, e))
        .collect::<Result<Vec<_>>>()?;

    let doc = KeystoreDocument {
        version: KEYSTORE_VERSION,
        entries,
    };

    for label in doc.duplicate_labels() {
        tracing::warn!(label, "keystore holds several entries with this label; the first one is used");
    }

    Ok(doc)
}

fn validate_entry(index: usize, raw: &Value) -> Result<KeystoreEntry> {
    let at = Some(index);
    let obj = raw
        .as_object()
        .ok_or_else(|| KeystoreError::schema(at, "(entry)", "is not an object"))?;

    for field in STRING_FIELDS {
        if !obj.get(field).is_some_and(Value::is_string) {
            return Err(KeystoreError::schema(at, field, "is missing or not a string"));
        }
    }
    let text = |field: &str| -> String {
        obj.get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    let address = text("address");
    if !address::is_address(&address) {
        return Err(KeystoreError::schema(
            at,
            "address",
            "is not a 0x-prefixed 40-hex-char address",
        ));
    }

    for field in HEX_FIELDS {
        if !is_hex(&text(field)) {
            return Err(KeystoreError::schema(at, field, "is not valid hex"));
        }
    }

    let kdf_params = validate_kdf_params(index, obj)?;

    Ok(KeystoreEntry {
        payload: EncryptedPayload {
            cipher: text("cipher"),
            kdf: text("kdf"),
            kdf_params,
            ciphertext: text("ciphertext"),
            iv: text("iv"),
            auth_tag: text("authTag"),
        },
        label: text("label"),
        address,
        created_at: text("createdAt"),
    })
}

fn validate_kdf_params(index: usize, entry: &Map<String, Value>) -> Result<KdfParams> {
    let at = Some(index);
    let params = entry
        .get("kdfParams")
        .and_then(Value::as_object)
        .ok_or_else(|| KeystoreError::schema(at, "kdfParams", "is not an object"))?;

    let integer = |field: &'static str| -> Result<u32> {
        params
            .get(field)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                KeystoreError::schema(
                    at,
                    format!("kdfParams.{field}"),
                    "is not a non-negative 32-bit integer",
                )
            })
    };

    let iterations = integer("iterations")?;
    let key_length = integer("keyLength")?;

    let digest = params
        .get("digest")
        .and_then(Value::as_str)
        .ok_or_else(|| KeystoreError::schema(at, "kdfParams.digest", "is not a string"))?;

    let salt = params
        .get("salt")
        .and_then(Value::as_str)
        .filter(|s| is_hex(s))
        .ok_or_else(|| KeystoreError::schema(at, "kdfParams.salt", "is not valid hex"))?;

    Ok(KdfParams {
        iterations,
        digest: digest.to_owned(),
        salt: salt.to_owned(),
        key_length,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_json(label: &str) -> Value {
        json!({
            "cipher": "aes-256-gcm",
            "kdf": "pbkdf2",
            "kdfParams": {
                "iterations": 262144,
                "digest": "sha256",
                "salt": "ab".repeat(32),
                "keyLength": 32
            },
            "ciphertext": "cd".repeat(66),
            "iv": "ef".repeat(12),
            "authTag": "01".repeat(16),
            "label": label,
            "address": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "createdAt": "2026-01-01T00:00:00.000Z"
        })
    }

    fn doc_json(entries: Vec<Value>) -> Value {
        json!({ "version": 1, "entries": entries })
    }

    fn schema_error(value: &Value) -> (Option<usize>, String) {
        match validate(value) {
            Err(KeystoreError::SchemaInvalid { index, field, .. }) => (index, field),
            other => panic!("expected SchemaInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_document_parses() {
        let doc = validate(&doc_json(vec![entry_json("default"), entry_json("backup")])).unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[0].label, "default");
        assert_eq!(doc.entries[1].label, "backup");
        assert_eq!(doc.entries[0].payload.kdf_params.iterations, 262_144);
        assert_eq!(doc.entries[0].payload.auth_tag, "01".repeat(16));
    }

    #[test]
    fn serialized_layout_matches_file_format() {
        let doc = validate(&doc_json(vec![entry_json("default")])).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, doc_json(vec![entry_json("default")]));
    }

    #[test]
    fn non_object_root_rejected() {
        assert_eq!(schema_error(&json!([1, 2])), (None, "(root)".into()));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut value = doc_json(vec![]);
        value["version"] = json!(2);
        assert_eq!(schema_error(&value), (None, "version".into()));

        value["version"] = json!("1");
        assert_eq!(schema_error(&value), (None, "version".into()));
    }

    #[test]
    fn entries_must_be_array() {
        let value = json!({ "version": 1, "entries": {} });
        assert_eq!(schema_error(&value), (None, "entries".into()));
    }

    #[test]
    fn missing_string_field_names_index() {
        let mut bad = entry_json("b");
        bad.as_object_mut().unwrap().remove("iv");
        let value = doc_json(vec![entry_json("a"), bad]);
        assert_eq!(schema_error(&value), (Some(1), "iv".into()));
    }

    #[test]
    fn non_string_field_rejected() {
        let mut bad = entry_json("a");
        bad["createdAt"] = json!(12345);
        assert_eq!(schema_error(&doc_json(vec![bad])), (Some(0), "createdAt".into()));
    }

    #[test]
    fn bad_address_rejected() {
        let mut bad = entry_json("a");
        bad["address"] = json!(format!("0x{}", "z".repeat(40)));
        assert_eq!(schema_error(&doc_json(vec![bad])), (Some(0), "address".into()));
    }

    #[test]
    fn odd_length_or_non_hex_payload_rejected() {
        let mut bad = entry_json("a");
        bad["ciphertext"] = json!("abc");
        assert_eq!(schema_error(&doc_json(vec![bad])), (Some(0), "ciphertext".into()));

        let mut bad = entry_json("a");
        bad["authTag"] = json!("zz".repeat(16));
        assert_eq!(schema_error(&doc_json(vec![bad])), (Some(0), "authTag".into()));
    }

    #[test]
    fn kdf_params_checked() {
        let mut bad = entry_json("a");
        bad["kdfParams"] = json!("pbkdf2");
        assert_eq!(schema_error(&doc_json(vec![bad])), (Some(0), "kdfParams".into()));

        let mut bad = entry_json("a");
        bad["kdfParams"]["iterations"] = json!(262144.5);
        assert_eq!(
            schema_error(&doc_json(vec![bad])),
            (Some(0), "kdfParams.iterations".into())
        );

        let mut bad = entry_json("a");
        bad["kdfParams"]["keyLength"] = json!(-32);
        assert_eq!(
            schema_error(&doc_json(vec![bad])),
            (Some(0), "kdfParams.keyLength".into())
        );

        let mut bad = entry_json("a");
        bad["kdfParams"]["digest"] = json!(256);
        assert_eq!(
            schema_error(&doc_json(vec![bad])),
            (Some(0), "kdfParams.digest".into())
        );

        let mut bad = entry_json("a");
        bad["kdfParams"]["salt"] = json!("not-hex");
        assert_eq!(
            schema_error(&doc_json(vec![bad])),
            (Some(0), "kdfParams.salt".into())
        );
    }

    #[test]
    fn malformed_json_reported() {
        let err = KeystoreDocument::parse("{ \"version\": 1, ").unwrap_err();
        assert!(matches!(err, KeystoreError::MalformedJson(_)));
    }

    #[test]
    fn duplicate_labels_kept_and_first_wins() {
        let mut second = entry_json("default");
        second["address"] = json!("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
        let doc = validate(&doc_json(vec![entry_json("default"), second])).unwrap();

        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.duplicate_labels(), vec!["default"]);
        assert_eq!(doc.position("default"), Some(0));
        assert_eq!(
            doc.find("default").unwrap().address,
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn summaries_omit_cipher_material() {
        let doc = validate(&doc_json(vec![entry_json("default")])).unwrap();
        let value = serde_json::to_value(doc.summaries()).unwrap();
        assert_eq!(
            value,
            json!([{
                "label": "default",
                "address": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
                "createdAt": "2026-01-01T00:00:00.000Z"
            }])
        );
    }
}
