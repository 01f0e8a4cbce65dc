// ABOUTME: SSH public key fingerprint computation for diagnostics.
// ABOUTME: Hashes the decoded key material with SHA256, matching the coven gateway format.

use crate::public_key::RawPublicKey;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the SHA256 fingerprint of a raw public key line (hex encoded, lowercase).
///
/// The base64 key material of an OpenSSH public key line is already the SSH
/// wire encoding of the key (algorithm name followed by key data), so hashing
/// its decoded bytes gives the same digest as Go's
/// `sha256.Sum256(ssh.PublicKey.Marshal())`, for any algorithm.
///
/// Returns `None` when the line has no key material or it is not valid base64.
pub fn fingerprint(key: &RawPublicKey) -> Option<String> {
    let material = key.key_material()?;
    let wire_data = base64::engine::general_purpose::STANDARD
        .decode(material)
        .ok()?;

    let mut hasher = Sha256::new();
    hasher.update(&wire_data);
    Some(hex::encode(hasher.finalize()))
}

/// Fingerprint for log lines and error messages; falls back to a marker for
/// keys that cannot be decoded.
pub(crate) fn display_fingerprint(key: &RawPublicKey) -> String {
    fingerprint(key).unwrap_or_else(|| "<malformed>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssh_key::{Algorithm, PrivateKey};

    /// Generate a fresh ed25519 key for testing.
    fn generate_test_key() -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .expect("should generate ed25519 key")
    }

    fn raw(key: &PrivateKey) -> RawPublicKey {
        RawPublicKey::new(key.public_key().to_openssh().expect("should serialize"))
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(&raw(&generate_test_key())).expect("should compute fingerprint");

        assert_eq!(fp.len(), 64, "fingerprint should be 64 hex chars");
        assert!(
            fp.chars().all(|c| c.is_ascii_hexdigit()),
            "fingerprint should be hex"
        );
        assert_eq!(fp, fp.to_lowercase(), "fingerprint should be lowercase");
    }

    #[test]
    fn test_fingerprint_matches_wire_format_hash() {
        // Build the ed25519 wire format by hand:
        // 4-byte algo length + "ssh-ed25519" + 4-byte key length + 32-byte key
        let key = generate_test_key();
        let key_bytes: [u8; 32] = match key.public_key().key_data() {
            ssh_key::public::KeyData::Ed25519(ed) => *ed.as_ref(),
            _ => panic!("expected ed25519 key"),
        };
        let algo_name = b"ssh-ed25519";
        let mut wire_data = Vec::new();
        wire_data.extend_from_slice(&(algo_name.len() as u32).to_be_bytes());
        wire_data.extend_from_slice(algo_name);
        wire_data.extend_from_slice(&(key_bytes.len() as u32).to_be_bytes());
        wire_data.extend_from_slice(&key_bytes);
        let expected = hex::encode(Sha256::digest(&wire_data));

        assert_eq!(fingerprint(&raw(&key)), Some(expected));
    }

    #[test]
    fn test_fingerprint_ignores_comment() {
        let key = generate_test_key();
        let plain = raw(&key);
        let commented = RawPublicKey::new(format!("{} alice@host1", plain.as_str()));

        assert_eq!(fingerprint(&plain), fingerprint(&commented));
    }

    #[test]
    fn test_fingerprint_different_keys() {
        let fp1 = fingerprint(&raw(&generate_test_key()));
        let fp2 = fingerprint(&raw(&generate_test_key()));

        assert_ne!(fp1, fp2, "different keys should have different fingerprints");
    }

    #[test]
    fn test_fingerprint_malformed() {
        assert_eq!(fingerprint(&RawPublicKey::new("notakey")), None);
        assert_eq!(
            fingerprint(&RawPublicKey::new("ssh-ed25519 !!!not-base64!!!")),
            None
        );
        assert_eq!(
            display_fingerprint(&RawPublicKey::new("notakey")),
            "<malformed>"
        );
    }
}
