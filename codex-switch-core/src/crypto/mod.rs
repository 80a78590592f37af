//! Cryptographic primitives for the account vault.
//!
//! This module provides:
//! - Argon2id key derivation
//! - XChaCha20-Poly1305 authenticated encryption
//! - Credential fingerprinting
//! - Key zeroization utilities

pub mod cipher;
pub mod fingerprint;
pub mod kdf;
pub mod zero;

pub use cipher::{seal, open, AAD_AUTH, AAD_VERIFIER};
pub use fingerprint::{canonical_json, fingerprint_json, fingerprint_text};
pub use kdf::{derive_key, generate_salt, KdfParams};
pub use zero::VaultKey;

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KdfFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed - wrong key or tampered ciphertext")]
    DecryptionFailed,

    #[error("ciphertext format invalid: {0}")]
    InvalidCiphertext(String),

    #[error("fingerprint failed: {0}")]
    FingerprintFailed(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
