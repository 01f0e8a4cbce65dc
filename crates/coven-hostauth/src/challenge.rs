// ABOUTME: Timestamp challenge generation and validation between hosts.
// ABOUTME: Presence, freshness, signature and authorization checks, cheapest first.

use crate::clock::{Clock, SystemClock};
use crate::config::HostAuthConfig;
use crate::error::{HostAuthError, Result};
use crate::fingerprint::display_fingerprint;
use crate::keystore::KeyStore;
use crate::public_key::RawPublicKey;
use crate::signature::{sign_message, verify_message};
use serde::{Deserialize, Deserializer, Serialize};
use ssh_key::PublicKey;
use tracing::{debug, info, warn};

/// How long a challenge stays valid after it is generated.
pub const CHALLENGE_DURATION_SECONDS: u64 = 5;

/// How far ahead of the verifier's clock a challenge may be dated.
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 5;

/// A signed, timestamped proof of identity.
///
/// Serialized with the field names `ssh_challenge`, `ssh_signature` and
/// `ssh_public_key`. Absent or `null` fields decode as empty strings and are
/// rejected by [`ChallengeProtocol::validate_challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Decimal UNIX seconds at generation time; this exact string is signed.
    #[serde(rename = "ssh_challenge", default, deserialize_with = "nullable_string")]
    pub timestamp: String,
    /// Base64 SSH wire-format signature of `timestamp`.
    #[serde(rename = "ssh_signature", default, deserialize_with = "nullable_string")]
    pub signature: String,
    /// The signer's public key line.
    #[serde(rename = "ssh_public_key", default, deserialize_with = "nullable_string")]
    pub public_key: String,
}

fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Challenge {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// First empty field, in the order the verifier checks them.
    fn missing_field(&self) -> Option<&'static str> {
        if self.public_key.is_empty() {
            Some("ssh_public_key")
        } else if self.timestamp.is_empty() {
            Some("ssh_challenge")
        } else if self.signature.is_empty() {
            Some("ssh_signature")
        } else {
            None
        }
    }
}

/// Produces challenges signed with this machine's key and verifies challenges
/// from peers against this machine's trusted keys.
///
/// Holds no state between calls; every call re-reads the key store.
pub struct ChallengeProtocol {
    keys: KeyStore,
    clock: Box<dyn Clock>,
    challenge_duration_secs: i64,
    max_clock_skew_secs: i64,
}

impl std::fmt::Debug for ChallengeProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeProtocol")
            .field("keys", &self.keys)
            .field("challenge_duration_secs", &self.challenge_duration_secs)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .finish_non_exhaustive()
    }
}

impl ChallengeProtocol {
    pub fn new(keys: KeyStore) -> Self {
        Self {
            keys,
            clock: Box::new(SystemClock),
            challenge_duration_secs: CHALLENGE_DURATION_SECONDS as i64,
            max_clock_skew_secs: MAX_CLOCK_SKEW_SECONDS as i64,
        }
    }

    pub fn from_config(config: &HostAuthConfig) -> Self {
        Self::new(KeyStore::from_config(config))
            .with_challenge_duration_secs(config.challenge_duration_secs)
            .with_max_clock_skew_secs(config.max_clock_skew_secs)
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_challenge_duration_secs(mut self, secs: u64) -> Self {
        self.challenge_duration_secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    pub fn with_max_clock_skew_secs(mut self, secs: u64) -> Self {
        self.max_clock_skew_secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Sign the current time with this machine's private key.
    ///
    /// # Errors
    /// Key discovery errors from [`KeyStore`], or `UnsupportedKeyType` if the
    /// private key cannot sign.
    pub fn generate_challenge(&self) -> Result<Challenge> {
        let private_key = self.keys.load_private_key()?;
        let public_key = self.keys.load_public_key()?;

        if let Ok(derived) = private_key.public_key().to_openssh() {
            if !RawPublicKey::new(derived).same_key(&public_key) {
                warn!(
                    "private key in {} does not match public key {}",
                    self.keys.location().display(),
                    display_fingerprint(&public_key)
                );
            }
        }

        let timestamp = self.clock.now_unix().to_string();
        let signature = sign_message(&private_key, &timestamp)?;
        debug!("Signed challenge {} as {}", timestamp, signature);

        Ok(Challenge {
            timestamp,
            signature,
            public_key: public_key.into_string(),
        })
    }

    /// Check a peer's challenge.
    ///
    /// Stages run in order and stop at the first failure: presence, freshness,
    /// signature, then authorization against this machine's trusted keys.
    pub fn validate_challenge(&self, challenge: &Challenge) -> Result<()> {
        if let Some(field) = challenge.missing_field() {
            return Err(HostAuthError::MissingField(field));
        }

        self.check_freshness(&challenge.timestamp)?;

        let public_key = PublicKey::from_openssh(challenge.public_key.trim())
            .map_err(HostAuthError::ParsePublicKey)?;
        let raw_key = RawPublicKey::new(&challenge.public_key);
        if let Err(e) = verify_message(&public_key, &challenge.timestamp, &challenge.signature) {
            if e.is_security_event() {
                warn!(
                    "Challenge {} does not match signature for key {}",
                    challenge.timestamp,
                    display_fingerprint(&raw_key)
                );
            }
            return Err(e);
        }

        if !self.keys.has_public_key(&raw_key)? {
            let fingerprint = display_fingerprint(&raw_key);
            warn!("Public key {} is not trusted by this machine", fingerprint);
            return Err(HostAuthError::UntrustedKey { fingerprint });
        }

        info!(
            "Validated challenge {} from {}",
            challenge.timestamp,
            display_fingerprint(&raw_key)
        );
        Ok(())
    }

    fn check_freshness(&self, timestamp: &str) -> Result<()> {
        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| HostAuthError::InvalidTimestamp(timestamp.to_string()))?;
        let now = self.clock.now_unix();

        let age_secs = now.saturating_sub(issued_at);
        if age_secs >= self.challenge_duration_secs {
            debug!("Challenge {} is {}s old, which is too old", issued_at, age_secs);
            return Err(HostAuthError::StaleChallenge {
                timestamp: issued_at,
                age_secs,
            });
        }

        let ahead_secs = issued_at.saturating_sub(now);
        if ahead_secs > self.max_clock_skew_secs {
            debug!("Challenge {} is {}s in the future", issued_at, ahead_secs);
            return Err(HostAuthError::FutureChallenge {
                timestamp: issued_at,
                ahead_secs,
            });
        }

        Ok(())
    }
}
