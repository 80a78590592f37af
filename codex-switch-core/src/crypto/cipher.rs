//! XChaCha20-Poly1305 encryption of credential blobs.
//!
//! On-disk layout per ciphertext: `version(1) || nonce(24) || aead_output`.
//! The associated data is a domain tag separating credential blobs from the
//! vault verifier, so a ciphertext can never be replayed across domains.

use crate::crypto::{CryptoError, Result, VaultKey};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

/// Ciphertext layout version.
const FORMAT_VERSION: u8 = 1;

/// XChaCha20 nonce length in bytes.
const NONCE_LEN: usize = 24;

/// Domain tag for credential blobs.
pub const AAD_AUTH: &[u8] = b"auth";

/// Domain tag for the vault verifier.
pub const AAD_VERIFIER: &[u8] = b"verifier";

/// Encrypt a plaintext under the vault key with a fresh random nonce.
pub fn seal(key: &VaultKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|error| CryptoError::EncryptionFailed(format!("cipher init: {error}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|error| CryptoError::EncryptionFailed(error.to_string()))?;

    let mut payload = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    payload.push(FORMAT_VERSION);
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(payload)
}

/// Decrypt a `version || nonce || aead_output` payload.
///
/// Any failure (unknown version, truncated payload, tag mismatch) is a hard
/// error; the plaintext is never silently substituted.
pub fn open(key: &VaultKey, aad: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 1 + NONCE_LEN + 16 {
        return Err(CryptoError::InvalidCiphertext(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }
    if payload[0] != FORMAT_VERSION {
        return Err(CryptoError::InvalidCiphertext(format!(
            "unknown format version {}",
            payload[0]
        )));
    }

    let (nonce_bytes, ciphertext) = payload[1..].split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|error| CryptoError::EncryptionFailed(format!("cipher init: {error}")))?;

    cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> VaultKey {
        VaultKey::from_bytes([7u8; 32])
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let plaintext = br#"{"tokens":{"access_token":"xyz"}}"#;

        let payload = seal(&key, AAD_AUTH, plaintext).unwrap();
        assert_eq!(payload[0], FORMAT_VERSION);

        let decrypted = open(&key, AAD_AUTH, &payload).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = test_key();
        let a = seal(&key, AAD_AUTH, b"same data").unwrap();
        let b = seal(&key, AAD_AUTH, b"same data").unwrap();
        assert_ne!(a[1..25], b[1..25]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let payload = seal(&test_key(), AAD_AUTH, b"secret").unwrap();
        let other = VaultKey::from_bytes([8u8; 32]);
        assert!(matches!(
            open(&other, AAD_AUTH, &payload),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn domain_tag_mismatch_fails() {
        let key = test_key();
        let payload = seal(&key, AAD_AUTH, b"secret").unwrap();
        assert!(open(&key, AAD_VERIFIER, &payload).is_err());
    }

    #[test]
    fn tampering_is_detected() {
        let key = test_key();
        let mut payload = seal(&key, AAD_AUTH, b"original").unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        assert!(open(&key, AAD_AUTH, &payload).is_err());
    }

    #[test]
    fn truncated_or_unknown_version_rejected() {
        let key = test_key();
        assert!(matches!(
            open(&key, AAD_AUTH, &[1u8; 10]),
            Err(CryptoError::InvalidCiphertext(_))
        ));

        let mut payload = seal(&key, AAD_AUTH, b"data").unwrap();
        payload[0] = 9;
        assert!(matches!(
            open(&key, AAD_AUTH, &payload),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }
}
