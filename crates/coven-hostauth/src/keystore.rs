// ABOUTME: Discovery of this machine's SSH key pair and its trusted public keys.
// ABOUTME: Re-reads the key source on every call; nothing is cached.

use crate::config::HostAuthConfig;
use crate::error::{HostAuthError, Result};
use crate::fingerprint::display_fingerprint;
use crate::public_key::RawPublicKey;
use crate::source::{
    candidate_files, DirKeySource, KeyFileEntry, KeyFileMatcher, KeyNameMatcher, KeySource,
};
use ssh_key::PrivateKey;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default name of the file listing trusted public keys.
pub const AUTHORIZED_KEYS_FILE: &str = "authorized_keys";

/// Locates this machine's own key material and the set of keys it trusts.
///
/// When several key files exist, the first in file-name order wins
/// (`id_dsa` < `id_ecdsa` < `id_ed25519` < `id_rsa`); the rest are ignored.
pub struct KeyStore {
    source: Box<dyn KeySource>,
    authorized_keys_file: String,
    private_key_matcher: Box<dyn KeyFileMatcher>,
    public_key_matcher: Box<dyn KeyFileMatcher>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("location", &self.source.location())
            .field("authorized_keys_file", &self.authorized_keys_file)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    pub fn new(source: impl KeySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            authorized_keys_file: AUTHORIZED_KEYS_FILE.to_string(),
            private_key_matcher: Box::new(KeyNameMatcher::private_keys()),
            public_key_matcher: Box::new(KeyNameMatcher::public_keys()),
        }
    }

    /// Key store over an SSH directory on disk.
    pub fn open(ssh_dir: impl AsRef<Path>) -> Self {
        Self::new(DirKeySource::new(ssh_dir.as_ref()))
    }

    pub fn from_config(config: &HostAuthConfig) -> Self {
        Self::open(config.ssh_dir_expanded())
            .with_authorized_keys_file(config.authorized_keys_file.clone())
    }

    pub fn with_authorized_keys_file(mut self, file_name: impl Into<String>) -> Self {
        self.authorized_keys_file = file_name.into();
        self
    }

    pub fn with_private_key_matcher(mut self, matcher: impl KeyFileMatcher + 'static) -> Self {
        self.private_key_matcher = Box::new(matcher);
        self
    }

    pub fn with_public_key_matcher(mut self, matcher: impl KeyFileMatcher + 'static) -> Self {
        self.public_key_matcher = Box::new(matcher);
        self
    }

    /// Directory the keys are read from.
    pub fn location(&self) -> &Path {
        self.source.location()
    }

    /// Candidate private key files, in the order they are tried.
    pub fn private_key_candidates(&self) -> Result<Vec<KeyFileEntry>> {
        candidate_files(self.source.as_ref(), self.private_key_matcher.as_ref())
    }

    /// Candidate public key files, in the order they are tried.
    pub fn public_key_candidates(&self) -> Result<Vec<KeyFileEntry>> {
        candidate_files(self.source.as_ref(), self.public_key_matcher.as_ref())
    }

    /// Load this machine's private key.
    ///
    /// # Errors
    /// `NoPrivateKeyFound` if no candidate exists, `ReadKey` if it cannot be
    /// read, `ParseKey` if it is not an OpenSSH private key.
    pub fn load_private_key(&self) -> Result<PrivateKey> {
        let entry = self
            .private_key_candidates()?
            .into_iter()
            .next()
            .ok_or_else(|| HostAuthError::NoPrivateKeyFound {
                dir: self.location().to_path_buf(),
            })?;

        let raw_key = self.read_entry(&entry)?;
        let private_key =
            PrivateKey::from_openssh(raw_key.trim()).map_err(|e| HostAuthError::ParseKey {
                path: entry.path.clone(),
                source: e,
            })?;

        debug!(
            "Loaded {} private key from {}",
            private_key.algorithm(),
            entry.path.display()
        );
        Ok(private_key)
    }

    /// Load this machine's public key as the trimmed contents of its `.pub` file.
    ///
    /// # Errors
    /// `NoPublicKeyFound` if no candidate exists, `ReadKey` if it cannot be read.
    pub fn load_public_key(&self) -> Result<RawPublicKey> {
        let entry = self
            .public_key_candidates()?
            .into_iter()
            .next()
            .ok_or_else(|| HostAuthError::NoPublicKeyFound {
                dir: self.location().to_path_buf(),
            })?;

        let public_key = RawPublicKey::new(self.read_entry(&entry)?);
        debug!(
            "Loaded public key {} from {}",
            display_fingerprint(&public_key),
            entry.path.display()
        );
        Ok(public_key)
    }

    /// This machine's public key followed by every line of the authorized
    /// keys file, trimmed but otherwise untouched.
    ///
    /// A missing authorized keys file counts as empty.
    pub fn load_all_public_keys(&self) -> Result<Vec<RawPublicKey>> {
        let own_key = self.load_public_key()?;

        let authorized_keys: Vec<RawPublicKey> = match self
            .source
            .read_file(&self.authorized_keys_file)?
        {
            Some(contents) => {
                let keys: Vec<_> = contents.lines().map(|line| RawPublicKey::new(line)).collect();
                debug!(
                    "Read {} public keys from {}",
                    keys.len(),
                    self.location().join(&self.authorized_keys_file).display()
                );
                keys
            }
            None => Vec::new(),
        };

        let mut all_keys = Vec::with_capacity(authorized_keys.len() + 1);
        all_keys.push(own_key);
        all_keys.extend(authorized_keys);
        Ok(all_keys)
    }

    /// Whether `candidate` carries the same key material as any trusted key.
    ///
    /// A candidate without key material is never trusted; that case returns
    /// `Ok(false)` without reading the key source.
    pub fn has_public_key(&self, candidate: &RawPublicKey) -> Result<bool> {
        if candidate.key_material().is_none() {
            warn!(
                "has_public_key was passed a public key without a second component: {}",
                candidate
            );
            return Ok(false);
        }

        let public_keys = self.load_all_public_keys()?;
        debug!("has_public_key loaded {} public keys", public_keys.len());

        match public_keys.iter().find(|key| key.same_key(candidate)) {
            Some(key) => {
                info!("has_public_key matched public key {}", display_fingerprint(key));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read_entry(&self, entry: &KeyFileEntry) -> Result<String> {
        self.source
            .read_file(&entry.file_name)?
            .ok_or_else(|| HostAuthError::ReadKey {
                path: entry.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "key file disappeared",
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryKeySource;
    use ssh_key::private::RsaKeypair;
    use ssh_key::{Algorithm, EcdsaCurve, LineEnding};

    /// Generate a fresh ed25519 key for testing.
    fn generate_test_key() -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .expect("should generate ed25519 key")
    }

    fn generate_ecdsa_key() -> PrivateKey {
        PrivateKey::random(
            &mut rand::thread_rng(),
            Algorithm::Ecdsa {
                curve: EcdsaCurve::NistP256,
            },
        )
        .expect("should generate ecdsa key")
    }

    fn generate_rsa_key() -> PrivateKey {
        RsaKeypair::random(&mut rand::thread_rng(), 2048)
            .expect("should generate rsa key")
            .into()
    }

    fn private_pem(key: &PrivateKey) -> String {
        key.to_openssh(LineEnding::LF)
            .expect("should serialize")
            .to_string()
    }

    fn public_line(key: &PrivateKey, comment: &str) -> String {
        let line = key.public_key().to_openssh().expect("should serialize");
        if comment.is_empty() {
            line
        } else {
            format!("{line} {comment}")
        }
    }

    #[test]
    fn test_load_private_key() {
        let key = generate_test_key();
        let store = KeyStore::new(MemoryKeySource::new().with_file("id_ed25519", private_pem(&key)));

        let loaded = store.load_private_key().expect("should load key");
        assert_eq!(loaded.public_key(), key.public_key());
    }

    #[test]
    fn test_load_private_key_first_match_wins() {
        let ecdsa = generate_ecdsa_key();
        let ed25519 = generate_test_key();
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_file("id_ed25519", private_pem(&ed25519))
                .with_file("id_ecdsa", private_pem(&ecdsa)),
        );

        let loaded = store.load_private_key().expect("should load key");
        assert_eq!(loaded.public_key(), ecdsa.public_key());
        assert_eq!(loaded.algorithm().as_str(), "ecdsa-sha2-nistp256");
    }

    #[test]
    fn test_load_private_key_skips_unreadable_and_directories() {
        let key = generate_rsa_key();
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_directory("id_dsa")
                .with_unreadable_file("id_ecdsa")
                .with_file("id_rsa", private_pem(&key)),
        );

        let loaded = store.load_private_key().expect("should load key");
        assert_eq!(loaded.public_key(), key.public_key());
        assert_eq!(loaded.algorithm().as_str(), "ssh-rsa");
    }

    #[test]
    fn test_load_private_key_none_found() {
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_file("id_ed25519.pub", "ssh-ed25519 AAAA")
                .with_file("known_hosts", ""),
        );

        let err = store.load_private_key().unwrap_err();
        assert!(matches!(err, HostAuthError::NoPrivateKeyFound { .. }));
    }

    #[test]
    fn test_load_private_key_invalid_format() {
        let store =
            KeyStore::new(MemoryKeySource::new().with_file("id_ed25519", "not a valid ssh key"));

        let err = store.load_private_key().unwrap_err();
        assert!(matches!(err, HostAuthError::ParseKey { .. }));
    }

    #[test]
    fn test_load_public_key_trims_contents() {
        let key = generate_test_key();
        let line = public_line(&key, "me@host");
        let store = KeyStore::new(
            MemoryKeySource::new().with_file("id_ed25519.pub", format!("{line}\n\n")),
        );

        let loaded = store.load_public_key().expect("should load public key");
        assert_eq!(loaded.as_str(), line);
    }

    #[test]
    fn test_load_public_key_none_found() {
        let key = generate_test_key();
        let store = KeyStore::new(MemoryKeySource::new().with_file("id_ed25519", private_pem(&key)));

        let err = store.load_public_key().unwrap_err();
        assert!(matches!(err, HostAuthError::NoPublicKeyFound { .. }));
    }

    #[test]
    fn test_load_all_public_keys_without_authorized_keys() {
        let key = generate_test_key();
        let store = KeyStore::new(
            MemoryKeySource::new().with_file("id_ed25519.pub", public_line(&key, "")),
        );

        let keys = store.load_all_public_keys().expect("should load keys");
        assert_eq!(keys, vec![RawPublicKey::new(public_line(&key, ""))]);
    }

    #[test]
    fn test_load_all_public_keys_preserves_lines() {
        let own = generate_test_key();
        let peer = generate_test_key();
        let peer_line = public_line(&peer, "peer@host");
        let authorized = format!("# comment\n  {peer_line}  \n\ngarbage\n{peer_line}\n");
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_file("id_ed25519.pub", public_line(&own, ""))
                .with_file("authorized_keys", authorized),
        );

        let keys: Vec<String> = store
            .load_all_public_keys()
            .expect("should load keys")
            .into_iter()
            .map(RawPublicKey::into_string)
            .collect();

        assert_eq!(
            keys,
            vec![
                public_line(&own, ""),
                "# comment".to_string(),
                peer_line.clone(),
                String::new(),
                "garbage".to_string(),
                peer_line,
            ]
        );
    }

    #[test]
    fn test_authorized_keys_with_invalid_utf8_comment() {
        let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
        let own = generate_test_key();
        let peer = generate_test_key();
        std::fs::write(temp_dir.path().join("id_ed25519.pub"), public_line(&own, ""))
            .expect("should write key");
        let mut authorized = public_line(&peer, "Jos").into_bytes();
        authorized.extend_from_slice(b"\xe9@laptop\n");
        std::fs::write(temp_dir.path().join("authorized_keys"), authorized)
            .expect("should write authorized keys");

        let store = KeyStore::open(temp_dir.path());
        let keys = store.load_all_public_keys().expect("should load keys");
        assert_eq!(keys.len(), 2);
        assert_eq!(
            keys[1].as_str(),
            format!("{} Jos\u{fffd}@laptop", public_line(&peer, ""))
        );

        assert!(store
            .has_public_key(&RawPublicKey::new(public_line(&own, "")))
            .expect("should check"));
        assert!(store
            .has_public_key(&RawPublicKey::new(public_line(&peer, "")))
            .expect("should check"));
    }

    #[test]
    fn test_custom_authorized_keys_file() {
        let own = generate_test_key();
        let peer = generate_test_key();
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_file("id_ed25519.pub", public_line(&own, ""))
                .with_file("trusted_hosts", public_line(&peer, "")),
        )
        .with_authorized_keys_file("trusted_hosts");

        assert!(store
            .has_public_key(&RawPublicKey::new(public_line(&peer, "")))
            .expect("should check"));
    }

    #[test]
    fn test_has_public_key_ignores_comments() {
        let own = generate_test_key();
        let peer = generate_test_key();
        let store = KeyStore::new(
            MemoryKeySource::new()
                .with_file("id_ed25519.pub", public_line(&own, "alice@host1"))
                .with_file("authorized_keys", public_line(&peer, "bob@host2")),
        );

        assert!(store
            .has_public_key(&RawPublicKey::new(public_line(&own, "bob@host2")))
            .expect("should check"));
        assert!(store
            .has_public_key(&RawPublicKey::new(public_line(&peer, "alice@host1")))
            .expect("should check"));
    }

    #[test]
    fn test_has_public_key_unknown_key() {
        let own = generate_test_key();
        let stranger = generate_test_key();
        let store = KeyStore::new(
            MemoryKeySource::new().with_file("id_ed25519.pub", public_line(&own, "")),
        );

        assert!(!store
            .has_public_key(&RawPublicKey::new(public_line(&stranger, "")))
            .expect("should check"));
    }

    #[test]
    fn test_has_public_key_malformed_candidate_fails_closed() {
        // No key files at all: a malformed candidate must not even reach discovery
        let store = KeyStore::new(MemoryKeySource::new());

        assert!(!store
            .has_public_key(&RawPublicKey::new("notakey"))
            .expect("should not error"));
        assert!(!store
            .has_public_key(&RawPublicKey::new(""))
            .expect("should not error"));
    }

    #[test]
    fn test_has_public_key_propagates_missing_own_key() {
        let store = KeyStore::new(MemoryKeySource::new());

        let err = store
            .has_public_key(&RawPublicKey::new("ssh-ed25519 AAAA"))
            .unwrap_err();
        assert!(matches!(err, HostAuthError::NoPublicKeyFound { .. }));
    }

    #[test]
    fn test_custom_matcher() {
        let key = generate_test_key();
        let store = KeyStore::new(MemoryKeySource::new().with_file("host_key", private_pem(&key)))
            .with_private_key_matcher(|e: &KeyFileEntry| e.is_file && e.file_name == "host_key");

        let loaded = store.load_private_key().expect("should load key");
        assert_eq!(loaded.public_key(), key.public_key());
    }

    #[test]
    fn test_open_reads_directory() {
        let temp_dir = tempfile::TempDir::new().expect("should create temp dir");
        let key = generate_test_key();
        std::fs::write(temp_dir.path().join("id_ed25519"), private_pem(&key))
            .expect("should write key");
        std::fs::write(temp_dir.path().join("id_ed25519.pub"), public_line(&key, "me@host"))
            .expect("should write key");

        let store = KeyStore::open(temp_dir.path());
        assert_eq!(store.location(), temp_dir.path());
        assert_eq!(
            store.load_private_key().expect("should load").public_key(),
            key.public_key()
        );
        assert_eq!(
            store.load_public_key().expect("should load").as_str(),
            public_line(&key, "me@host")
        );
    }
}
