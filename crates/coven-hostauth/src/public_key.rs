// ABOUTME: Raw OpenSSH public key lines and their key-material identity.
// ABOUTME: Two keys are the same when their second whitespace token matches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A public key line of the form `<algorithm> <base64-key> [comment]`.
///
/// The line is kept exactly as read (after trimming), so malformed entries
/// and comments from `authorized_keys` survive untouched. Identity is the
/// base64 key material only; the algorithm label and comment are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RawPublicKey(String);

impl RawPublicKey {
    /// Wrap a raw line, trimming surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The second whitespace-delimited token, if any.
    pub fn key_material(&self) -> Option<&str> {
        self.0.split_whitespace().nth(1)
    }

    /// Whether both lines carry identical key material.
    ///
    /// Comparison is exact and case-sensitive. A line without key material
    /// never matches anything, including another malformed line.
    pub fn same_key(&self, other: &RawPublicKey) -> bool {
        match (self.key_material(), other.key_material()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RawPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RawPublicKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for RawPublicKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<RawPublicKey> for String {
    fn from(key: RawPublicKey) -> Self {
        key.0
    }
}
