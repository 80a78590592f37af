//! Key zeroization.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The derived symmetric vault key.
///
/// Held in memory only while the vault is unlocked, zeroized on drop and on
/// explicit lock. Never persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; 32],
}

impl VaultKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Get a reference to the key bytes (use sparingly).
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bytes_roundtrip() {
        let key = VaultKey::from_bytes([3u8; 32]);
        assert_eq!(key.as_bytes(), &[3u8; 32]);
    }

    #[test]
    fn explicit_zeroize_clears_bytes() {
        let mut key = VaultKey::from_bytes([9u8; 32]);
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = VaultKey::from_bytes([0xAB; 32]);
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("ab"));
        assert!(!rendered.contains("171"));
    }
}
