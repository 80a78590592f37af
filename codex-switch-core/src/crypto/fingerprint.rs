//! Credential fingerprinting.
//!
//! The auth JSON is re-emitted in canonical form (object keys sorted
//! recursively, no insignificant whitespace), hashed with SHA-256, and the
//! first 8 bytes are hex-encoded. The fingerprint identifies a credential
//! without exposing it and is stable across re-encryption.

use crate::crypto::{CryptoError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in the fingerprint (16 hex chars).
const FINGERPRINT_BYTES: usize = 8;

/// Re-emit a JSON value in canonical form.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => {
            let escaped = serde_json::to_string(text)
                .map_err(|error| CryptoError::FingerprintFailed(error.to_string()))?;
            out.push_str(&escaped);
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                let escaped = serde_json::to_string(key)
                    .map_err(|error| CryptoError::FingerprintFailed(error.to_string()))?;
                out.push_str(&escaped);
                out.push(':');
                // Key came from the map, so the lookup cannot miss.
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Fingerprint a parsed auth JSON value.
pub fn fingerprint_json(value: &Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(&digest[..FINGERPRINT_BYTES]))
}

/// Parse raw auth text as JSON and fingerprint it.
pub fn fingerprint_text(text: &str) -> Result<String> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| CryptoError::FingerprintFailed(format!("invalid JSON: {error}")))?;
    fingerprint_json(&value)
}
