//! Argon2id key derivation for master password processing.
//!
//! Default parameters:
//! - Memory cost: 64 MiB (65,536 KiB)
//! - Time cost: 3 iterations
//! - Parallelism: 1 lane
//! - Output length: 32 bytes
//! - Salt length: 16 bytes, random per vault

use crate::crypto::{CryptoError, Result, VaultKey};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Parameters for Argon2id key derivation.
///
/// Stored alongside the vault salt so the same key can be re-derived after
/// future parameter upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_kib: u32,

    /// Time cost (number of iterations)
    pub iters: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_kib: 65_536,
            iters: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Verify that parameters are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.mem_kib < 65_536 {
            return Err(CryptoError::KdfFailed(
                "memory cost too low (minimum: 64 MiB)".to_string(),
            ));
        }
        if self.iters < 3 {
            return Err(CryptoError::KdfFailed(
                "time cost too low (minimum: 3)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a fresh random vault salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    rand::random()
}

/// Derive the 32-byte vault key from a master password.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<VaultKey> {
    params.validate()?;

    let argon_params = Params::new(params.mem_kib, params.iters, params.parallelism, Some(32))
        .map_err(|error| CryptoError::KdfFailed(format!("invalid parameters: {error}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|error| CryptoError::KdfFailed(format!("hashing failed: {error}")))?;

    Ok(VaultKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        let params = KdfParams::default();
        assert_eq!(params.mem_kib, 65_536);
        assert_eq!(params.iters, 3);
        assert_eq!(params.parallelism, 1);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn params_validation_rejects_weak_settings() {
        let mut params = KdfParams::default();

        params.mem_kib = 1_024;
        assert!(params.validate().is_err());

        params.mem_kib = 65_536;
        params.iters = 1;
        assert!(params.validate().is_err());

        params.iters = 3;
        params.parallelism = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn derivation_is_deterministic_per_salt() {
        let params = KdfParams::default();
        let salt = generate_salt();

        let key1 = derive_key(b"correct horse battery", &salt, &params).unwrap();
        let key2 = derive_key(b"correct horse battery", &salt, &params).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let key3 = derive_key(b"different password", &salt, &params).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());

        let other_salt = generate_salt();
        let key4 = derive_key(b"correct horse battery", &other_salt, &params).unwrap();
        assert_ne!(key1.as_bytes(), key4.as_bytes());
    }
}
