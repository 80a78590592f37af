//! Live auth file handling.
//!
//! The auth JSON is treated as opaque: it is parsed for fingerprinting and a
//! bearer token is extracted for probing, but its schema is never interpreted
//! beyond that.

use crate::{CodexSwitchError, Result};
use serde_json::Value;

/// Parse auth text as a JSON object.
pub fn parse_auth_json(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|error| CodexSwitchError::InvalidInput(format!("auth file is not JSON: {error}")))?;
    if !value.is_object() {
        return Err(CodexSwitchError::InvalidInput(
            "auth file must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Extract the bearer token: `tokens.access_token`, falling back to a
/// top-level `access_token`.
pub fn extract_access_token(value: &Value) -> Option<String> {
    let nested = value
        .get("tokens")
        .and_then(|tokens| tokens.get("access_token"))
        .and_then(Value::as_str);
    let token = nested.or_else(|| value.get("access_token").and_then(Value::as_str));
    token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
}
