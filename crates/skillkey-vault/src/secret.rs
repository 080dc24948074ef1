//! Zeroizing wrapper for passwords and private keys.
//!
//! Secret material only ever travels through [`SecretString`]. The backing
//! buffer is overwritten when the value is dropped. Erasure is best-effort:
//! copies made by the allocator on reallocation, by the terminal layer, or by
//! callers that call [`SecretString::expose`] and clone the result are out of
//! reach.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// An owned string that is zeroized on drop and never printed by `Debug`.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap an owned string. The caller gives up its copy.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Borrow the secret. Keep the borrow short.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters, used for the password policy.
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// Compare two secrets without short-circuiting on the first differing
    /// byte.
    pub fn matches(&self, other: &SecretString) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}
