//! Public address derivation for stored private keys.
//!
//! The keystore never trusts the `address` it stores: the field is not
//! covered by the AEAD tag, so it is recomputed from the decrypted secret
//! whenever the answer matters. The derivation itself sits behind the
//! [`AddressDeriver`] trait; [`EvmAddressDeriver`] is the secp256k1 /
//! Keccak-256 implementation used by the CLI.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use k256::SecretKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use regex::Regex;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::error::{KeystoreError, Result};

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid"));

static PRIVATE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("private key pattern is valid"));

/// Whether `s` is a `0x`-prefixed, 40 hex digit address (any letter case).
pub fn is_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account address.
///
/// Equality is byte-wise, so two spellings that differ only in letter case
/// compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Render with the EIP-55 mixed-case checksum.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = KeystoreError;

    /// Parse `0x` + 40 hex digits in any letter case.
    ///
    /// Malformed input is reported as [`KeystoreError::SchemaInvalid`] on the
    /// `address` field.
    fn from_str(s: &str) -> Result<Self> {
        if !is_address(s) {
            return Err(KeystoreError::schema(
                None,
                "address",
                "is not a 0x-prefixed 40-hex-char address",
            ));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(&s[2..], &mut bytes)
            .map_err(|e| KeystoreError::schema(None, "address", format!("is not valid hex: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Maps a raw private key to its public address.
///
/// Implementations must be pure and deterministic, and must fail with
/// [`KeystoreError::InvalidSecret`] on malformed input.
pub trait AddressDeriver: Send + Sync {
    fn address_of(&self, secret: &str) -> Result<Address>;
}

/// secp256k1 private key to EVM address:
/// `keccak256(uncompressed_pubkey[1..])[12..]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmAddressDeriver;

impl AddressDeriver for EvmAddressDeriver {
    fn address_of(&self, secret: &str) -> Result<Address> {
        if !PRIVATE_KEY_RE.is_match(secret) {
            return Err(KeystoreError::InvalidSecret {
                reason: "must be 0x-prefixed 64 hex characters".into(),
            });
        }

        let mut scalar = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(&secret[2..], &mut scalar[..]).map_err(|_| {
            KeystoreError::InvalidSecret {
                reason: "not valid hex".into(),
            }
        })?;

        let secret_key =
            SecretKey::from_slice(&scalar[..]).map_err(|_| KeystoreError::InvalidSecret {
                reason: "scalar is zero or outside the secp256k1 group order".into(),
            })?;

        let point = secret_key.public_key().to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);

        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&hash[12..]);
        Ok(Address(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_key_derives_known_address() {
        let secret = format!("0x{}1", "0".repeat(63));
        let address = EvmAddressDeriver.address_of(&secret).unwrap();
        assert_eq!(
            address.to_checksum(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn checksum_matches_eip55_vector() {
        let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert_eq!(
            address.to_string(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn parse_is_case_insensitive() {
        let a: Address = "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED".parse().unwrap();
        let b: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_secret_rejected() {
        let cases = [
            String::new(),
            "0x1234".to_owned(),
            "aa".repeat(32),
            format!("0x{}", "zz".repeat(32)),
        ];
        for bad in &cases {
            let err = EvmAddressDeriver.address_of(bad).unwrap_err();
            assert!(matches!(err, KeystoreError::InvalidSecret { .. }), "{bad}");
        }
    }

    #[test]
    fn malformed_address_is_a_schema_error() {
        for bad in ["", "0x1234", "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"] {
            let err = bad.parse::<Address>().unwrap_err();
            assert_eq!(err.code(), "schema_invalid", "{bad}");
            assert!(matches!(
                err,
                KeystoreError::SchemaInvalid { index: None, ref field, .. } if field == "address"
            ));
        }
    }

    #[test]
    fn zero_scalar_rejected() {
        let secret = format!("0x{}", "0".repeat(64));
        assert!(EvmAddressDeriver.address_of(&secret).is_err());
    }

    #[test]
    fn address_shape_check() {
        assert!(is_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_address("0xzzzeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }
}
