// ABOUTME: SSH wire-format signatures over challenge messages.
// ABOUTME: Signs with any ed25519, ECDSA or RSA private key ssh-key can load.

use crate::error::{HostAuthError, Result};
use base64::Engine;
use ed25519_dalek::{Signer, Verifier};
use ssh_key::{Algorithm, PrivateKey, PublicKey, Signature};
use tracing::debug;

/// Key algorithms that can sign and verify challenges.
fn can_sign(algorithm: &Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::Ed25519 | Algorithm::Ecdsa { .. } | Algorithm::Rsa { .. }
    )
}

/// Sign a message with the private key.
///
/// Returns the signature in SSH wire format, base64 encoded:
/// - Algorithm name as SSH string (`ssh-ed25519`, `ecdsa-sha2-nistp256`, `rsa-sha2-512`, ...)
/// - Signature blob as SSH string
///
/// RSA keys sign with SHA-512.
///
/// # Errors
/// Returns `HostAuthError::UnsupportedKeyType` for DSA, security-key and
/// encrypted keys, `HostAuthError::Signing` if the key refuses to sign.
pub fn sign_message(private_key: &PrivateKey, message: &str) -> Result<String> {
    if private_key.is_encrypted() {
        return Err(HostAuthError::UnsupportedKeyType(
            "encrypted private key".to_string(),
        ));
    }

    let algorithm = private_key.algorithm();
    if !can_sign(&algorithm) {
        return Err(HostAuthError::UnsupportedKeyType(algorithm.to_string()));
    }

    let signature: Signature =
        private_key
            .try_sign(message.as_bytes())
            .map_err(|e| HostAuthError::Signing {
                algorithm: algorithm.to_string(),
                reason: e.to_string(),
            })?;
    let wire_data = Vec::<u8>::try_from(signature).map_err(|e| HostAuthError::Signing {
        algorithm: algorithm.to_string(),
        reason: e.to_string(),
    })?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&wire_data))
}

/// Verify a base64 SSH wire-format signature of `message` against `public_key`.
///
/// Any signature that cannot be decoded, carries trailing bytes, names an
/// algorithm the key does not use, or fails cryptographic verification is
/// reported as `HostAuthError::SignatureMismatch`.
///
/// # Errors
/// Returns `HostAuthError::UnsupportedKeyType` for DSA and security-key public keys.
pub fn verify_message(public_key: &PublicKey, message: &str, signature_b64: &str) -> Result<()> {
    let algorithm = public_key.algorithm();
    if !can_sign(&algorithm) {
        return Err(HostAuthError::UnsupportedKeyType(algorithm.to_string()));
    }

    let wire_data = base64::engine::general_purpose::STANDARD
        .decode(signature_b64.trim())
        .map_err(|e| {
            debug!("signature is not valid base64: {}", e);
            HostAuthError::SignatureMismatch
        })?;

    let signature = decode_signature(&wire_data).ok_or_else(|| {
        debug!("signature is not in SSH wire format");
        HostAuthError::SignatureMismatch
    })?;

    // PublicKey::verify is the SSHSIG variant; the challenge uses the raw signer trait
    Verifier::verify(public_key, message.as_bytes(), &signature).map_err(|e| {
        debug!(
            "{} signature did not verify against {} key: {}",
            signature.algorithm(),
            algorithm,
            e
        );
        HostAuthError::SignatureMismatch
    })
}

/// Decode an SSH signature, rejecting anything that does not re-encode to
/// exactly the same bytes (trailing data, non-canonical lengths).
fn decode_signature(wire_data: &[u8]) -> Option<Signature> {
    let signature = Signature::try_from(wire_data).ok()?;
    let canonical = Vec::<u8>::try_from(signature.clone()).ok()?;
    (canonical == wire_data).then_some(signature)
}
