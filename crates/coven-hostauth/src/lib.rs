// ABOUTME: Host-to-host authentication with the SSH keys already on a machine.
// ABOUTME: Key discovery, trusted key matching, and signed timestamp challenges.

//! # coven-hostauth
//!
//! One host proves its identity to another by signing the current UNIX time
//! with its SSH private key. The verifier checks that the challenge is fresh,
//! that the signature matches the supplied public key, and that the key is
//! one it trusts: its own public key or a line of `authorized_keys`.
//!
//! ## Features
//!
//! - **Key discovery**: `id_rsa`, `id_dsa`, `id_ecdsa`, `id_ed25519` and their
//!   `.pub` files, first match in file-name order
//! - **Trust**: keys compare by base64 key material only, comments ignored
//! - **Challenges**: JSON payload with `ssh_challenge`, `ssh_signature`,
//!   `ssh_public_key`, valid for five seconds
//!
//! Transport is up to the caller.
//!
//! ## Example
//!
//! ```no_run
//! use coven_hostauth::{ChallengeProtocol, Challenge, KeyStore};
//!
//! // On the host proving its identity
//! let prover = ChallengeProtocol::new(KeyStore::open("/home/me/.ssh"));
//! let payload = prover.generate_challenge().expect("should sign").to_json().expect("json");
//!
//! // On the verifying host, after the payload arrives
//! let verifier = ChallengeProtocol::new(KeyStore::open("/home/peer/.ssh"));
//! let challenge = Challenge::from_json(&payload).expect("should decode");
//! verifier.validate_challenge(&challenge).expect("peer should be trusted");
//! ```

mod challenge;
mod clock;
mod config;
mod error;
mod fingerprint;
mod keystore;
mod public_key;
mod signature;
mod source;

// Re-export primary types and functions
pub use challenge::{Challenge, ChallengeProtocol, CHALLENGE_DURATION_SECONDS, MAX_CLOCK_SKEW_SECONDS};
pub use clock::{current_timestamp, Clock, ManualClock, SystemClock};
pub use config::{default_config_path, xdg_config_dir, HostAuthConfig};
pub use error::{HostAuthError, Result};
pub use fingerprint::fingerprint;
pub use keystore::{KeyStore, AUTHORIZED_KEYS_FILE};
pub use public_key::RawPublicKey;
pub use signature::{sign_message, verify_message};
pub use source::{
    candidate_files, DirKeySource, KeyFileEntry, KeyFileMatcher, KeyNameMatcher, KeySource,
    MemoryKeySource, PRIVATE_KEY_NAMES,
};

// Re-export ssh_key types for convenience
pub use ssh_key::{PrivateKey, PublicKey};
