//! Password-based AES-256-GCM encryption of keystore secrets using `ring`.
//!
//! - **Key derivation**: PBKDF2-HMAC with the digest, salt, iteration count
//!   and key length recorded in each entry.
//! - **Encryption**: AES-256-GCM with a fresh random 96-bit nonce and a fresh
//!   random 256-bit salt per call. The 128-bit tag is stored separately from
//!   the ciphertext.
//! - **Tamper pre-pass**: before any key is derived for decryption, the stored
//!   parameters are checked against [`KDF_ITERATIONS`], [`KEY_LEN`],
//!   [`KDF_DIGEST`], [`CIPHER_NAME`] and [`KDF_NAME`]. This stops an attacker
//!   who can write the keystore from lowering the work factor of a stolen
//!   ciphertext.
//!
//! Derived keys and decrypted buffers are held in [`Zeroizing`] containers and
//! wiped when dropped.

use std::num::NonZeroU32;
use std::time::Instant;

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{KeystoreError, Result};
use crate::secret::SecretString;

/// Cipher name recorded in new entries.
pub const CIPHER_NAME: &str = "aes-256-gcm";

/// KDF name recorded in new entries.
pub const KDF_NAME: &str = "pbkdf2";

/// PBKDF2 digest recorded in new entries.
pub const KDF_DIGEST: &str = "sha256";

/// PBKDF2 iteration count for new entries, and the minimum accepted on
/// decryption.
pub const KDF_ITERATIONS: u32 = 262_144;

/// Length of the derived AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Largest key length PBKDF2 is asked to produce.
const MAX_KEY_LEN: usize = 64;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Everything needed to re-derive an entry's key from its password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub iterations: u32,
    pub digest: String,
    /// Hex-encoded salt.
    pub salt: String,
    pub key_length: u32,
}

/// The encrypted half of a keystore entry, all binary fields hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors, so each
/// `ring` key object is used for a single seal or open.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

fn pbkdf2_algorithm(digest: &str) -> Option<pbkdf2::Algorithm> {
    match digest {
        "sha1" => Some(pbkdf2::PBKDF2_HMAC_SHA1),
        "sha256" => Some(pbkdf2::PBKDF2_HMAC_SHA256),
        "sha384" => Some(pbkdf2::PBKDF2_HMAC_SHA384),
        "sha512" => Some(pbkdf2::PBKDF2_HMAC_SHA512),
        _ => None,
    }
}

/// Derive a symmetric key from `password` and `salt` with PBKDF2-HMAC.
///
/// All parameters are taken from the caller; nothing is defaulted.
///
/// # Errors
///
/// Returns [`KeystoreError::TamperSuspected`] for an unsupported digest, a
/// zero iteration count or an out-of-range key length.
pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    key_length: usize,
    digest: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let algorithm = pbkdf2_algorithm(digest).ok_or_else(|| KeystoreError::TamperSuspected {
        field: "kdfParams.digest",
        expected: "sha1|sha256|sha384|sha512".into(),
        observed: format!("\"{digest}\""),
    })?;
    let iterations = NonZeroU32::new(iterations).ok_or_else(|| KeystoreError::TamperSuspected {
        field: "kdfParams.iterations",
        expected: "> 0".into(),
        observed: "0".into(),
    })?;
    if key_length == 0 || key_length > MAX_KEY_LEN {
        return Err(KeystoreError::TamperSuspected {
            field: "kdfParams.keyLength",
            expected: format!("1..={MAX_KEY_LEN}"),
            observed: key_length.to_string(),
        });
    }

    let started = Instant::now();
    let mut key = Zeroizing::new(vec![0u8; key_length]);
    pbkdf2::derive(algorithm, iterations, salt, password, &mut key);

    tracing::debug!(
        iterations = iterations.get(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "derived key via PBKDF2"
    );
    Ok(key)
}

// ---------------------------------------------------------------------------
// Tamper pre-pass
// ---------------------------------------------------------------------------

/// Check the stored cipher and KDF parameters against the expected values.
///
/// Each check reports its own field. No key is derived here.
pub fn check_parameters(payload: &EncryptedPayload) -> Result<()> {
    let params = &payload.kdf_params;

    if params.iterations < KDF_ITERATIONS {
        return Err(KeystoreError::TamperSuspected {
            field: "kdfParams.iterations",
            expected: format!(">= {KDF_ITERATIONS}"),
            observed: params.iterations.to_string(),
        });
    }
    if params.key_length as usize != KEY_LEN {
        return Err(KeystoreError::TamperSuspected {
            field: "kdfParams.keyLength",
            expected: KEY_LEN.to_string(),
            observed: params.key_length.to_string(),
        });
    }
    if params.digest != KDF_DIGEST {
        return Err(KeystoreError::TamperSuspected {
            field: "kdfParams.digest",
            expected: format!("\"{KDF_DIGEST}\""),
            observed: format!("\"{}\"", params.digest),
        });
    }
    if payload.cipher != CIPHER_NAME {
        return Err(KeystoreError::TamperSuspected {
            field: "cipher",
            expected: format!("\"{CIPHER_NAME}\""),
            observed: format!("\"{}\"", payload.cipher),
        });
    }
    if payload.kdf != KDF_NAME {
        return Err(KeystoreError::TamperSuspected {
            field: "kdf",
            expected: format!("\"{KDF_NAME}\""),
            observed: format!("\"{}\"", payload.kdf),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `secret` under a key derived from `password`.
///
/// A fresh salt and nonce are drawn for every call, so encrypting the same
/// input twice never yields the same ciphertext.
///
/// # Errors
///
/// Returns [`KeystoreError::EncryptionFailed`] if the system RNG or `ring`
/// reports a failure.
pub fn encrypt(secret: &SecretString, password: &SecretString) -> Result<EncryptedPayload> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    fill_random(&mut nonce)?;

    let key = derive_key(
        password.expose().as_bytes(),
        &salt,
        KDF_ITERATIONS,
        KEY_LEN,
        KDF_DIGEST,
    )?;

    let unbound_key = UnboundKey::new(AEAD_ALG, &key).map_err(|_| KeystoreError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    drop(key);

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = Zeroizing::new(secret.expose().as_bytes().to_vec());
    let tag = sealing_key
        .seal_in_place_separate_tag(Aad::empty(), &mut in_out)
        .map_err(|_| KeystoreError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(ciphertext_len = in_out.len(), "encrypted secret");

    Ok(EncryptedPayload {
        cipher: CIPHER_NAME.to_owned(),
        kdf: KDF_NAME.to_owned(),
        kdf_params: KdfParams {
            iterations: KDF_ITERATIONS,
            digest: KDF_DIGEST.to_owned(),
            salt: hex::encode(salt),
            key_length: KEY_LEN as u32,
        },
        ciphertext: hex::encode(&*in_out),
        iv: hex::encode(nonce),
        auth_tag: hex::encode(tag.as_ref()),
    })
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Decrypt an entry's payload with `password`.
///
/// Runs [`check_parameters`] first, then derives the key from the entry's own
/// salt, digest, iteration count and key length.
///
/// # Errors
///
/// - [`KeystoreError::TamperSuspected`] if a stored parameter fails the
///   pre-pass.
/// - [`KeystoreError::DecryptionFailed`] for a wrong password, a modified
///   ciphertext or tag, or undecodable fields. The cause is not disclosed.
pub fn decrypt(payload: &EncryptedPayload, password: &SecretString) -> Result<SecretString> {
    check_parameters(payload)?;

    let params = &payload.kdf_params;
    let salt = hex::decode(&params.salt).map_err(|_| KeystoreError::DecryptionFailed)?;
    let iv = hex::decode(&payload.iv).map_err(|_| KeystoreError::DecryptionFailed)?;
    let tag = hex::decode(&payload.auth_tag).map_err(|_| KeystoreError::DecryptionFailed)?;
    let ciphertext = hex::decode(&payload.ciphertext).map_err(|_| KeystoreError::DecryptionFailed)?;

    let nonce: [u8; NONCE_LEN_BYTES] = iv
        .as_slice()
        .try_into()
        .map_err(|_| KeystoreError::DecryptionFailed)?;
    if tag.len() != TAG_LEN {
        return Err(KeystoreError::DecryptionFailed);
    }

    let key = derive_key(
        password.expose().as_bytes(),
        &salt,
        params.iterations,
        params.key_length as usize,
        &params.digest,
    )?;

    let unbound_key = UnboundKey::new(AEAD_ALG, &key).map_err(|_| KeystoreError::DecryptionFailed)?;
    drop(key);

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_LEN));
    in_out.extend_from_slice(&ciphertext);
    in_out.extend_from_slice(&tag);

    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| KeystoreError::DecryptionFailed)?;
    let text = std::str::from_utf8(plaintext).map_err(|_| KeystoreError::DecryptionFailed)?;

    tracing::trace!(plaintext_len = text.len(), "decrypted secret");

    Ok(SecretString::new(text.to_owned()))
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Fill `buf` from the system CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| KeystoreError::EncryptionFailed {
            reason: "system random number generator failed".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
