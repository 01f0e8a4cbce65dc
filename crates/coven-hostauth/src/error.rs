// ABOUTME: Error types for key discovery and challenge validation using thiserror.
// ABOUTME: Every validation stage reports through the same HostAuthError enum.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while discovering keys or exchanging challenges.
#[derive(Error, Debug)]
pub enum HostAuthError {
    /// No file named like a private key was found in the SSH directory.
    #[error("no private keys found in {dir}")]
    NoPrivateKeyFound { dir: PathBuf },

    /// No file named like a public key was found in the SSH directory.
    #[error("no public keys found in {dir}")]
    NoPublicKeyFound { dir: PathBuf },

    /// Failed to list the SSH directory.
    #[error("failed to list SSH directory {path}: {source}")]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a key file from disk.
    #[error("failed to read SSH key from {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A private key file did not parse as an OpenSSH private key.
    #[error("failed to parse SSH key from {path}: {source}")]
    ParseKey {
        path: PathBuf,
        #[source]
        source: ssh_key::Error,
    },

    /// The public key carried by a challenge did not parse.
    #[error("failed to parse challenge public key: {0}")]
    ParsePublicKey(#[source] ssh_key::Error),

    /// Unsupported key type for signing or verification.
    #[error("unsupported key type: {0} (ed25519, ECDSA and RSA are supported)")]
    UnsupportedKeyType(String),

    /// A supported private key failed to produce a signature.
    #[error("failed to sign challenge with {algorithm} key: {reason}")]
    Signing { algorithm: String, reason: String },

    /// A challenge field was absent or empty.
    #[error("challenge is missing {0}")]
    MissingField(&'static str),

    /// The challenge timestamp is not a decimal UNIX second count.
    #[error("challenge timestamp {0:?} is not an integer")]
    InvalidTimestamp(String),

    /// The challenge is older than the freshness window.
    #[error("challenge {timestamp} is {age_secs}s old, which is too old")]
    StaleChallenge { timestamp: i64, age_secs: i64 },

    /// The challenge is dated further ahead than the allowed clock skew.
    #[error("challenge {timestamp} is {ahead_secs}s in the future")]
    FutureChallenge { timestamp: i64, ahead_secs: i64 },

    /// The signature does not verify against the timestamp and public key.
    #[error("challenge does not match signature")]
    SignatureMismatch,

    /// The signing key is valid but not trusted by this machine.
    #[error("public key {fingerprint} is not trusted by this machine")]
    UntrustedKey { fingerprint: String },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A challenge payload could not be encoded or decoded as JSON.
    #[error("invalid challenge payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HostAuthError {
    /// Failures that indicate a forged or foreign credential rather than a
    /// malformed or expired one.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            HostAuthError::SignatureMismatch | HostAuthError::UntrustedKey { .. }
        )
    }

    /// Whether generating a fresh challenge and repeating the whole handshake
    /// could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HostAuthError::StaleChallenge { .. } | HostAuthError::FutureChallenge { .. }
        )
    }
}

/// Result type alias using HostAuthError.
pub type Result<T> = std::result::Result<T, HostAuthError>;
