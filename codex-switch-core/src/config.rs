//! Flat application configuration.
//!
//! One value with every recognized knob, constructed at startup and threaded
//! through the application context. The probe and switch sections are
//! persisted in the settings row of the store; the KDF section is captured in
//! the vault metadata at init time.

use crate::crypto::KdfParams;
use serde::{Deserialize, Serialize};

/// Quota prober configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Snapshot cache TTL in seconds; non-forced refreshes inside the TTL
    /// reuse the latest stored snapshot.
    pub cache_ttl_s: u64,
    /// Maximum concurrent probes across a refresh fan-out.
    pub max_concurrency: usize,
    /// Response header carrying the remaining quota value.
    pub remaining_header: String,
    /// Response header carrying the quota unit.
    pub unit_header: String,
    /// Response header carrying the RFC3339 reset timestamp.
    pub reset_at_header: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            cache_ttl_s: 60,
            max_concurrency: 4,
            remaining_header: "x-codex-remaining".to_string(),
            unit_header: "x-codex-unit".to_string(),
            reset_at_header: "x-codex-reset-at".to_string(),
        }
    }
}

impl ProbeConfig {
    /// Clamp the tunable fields to sane operating ranges.
    pub fn clamped(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(1_000, 30_000);
        self.cache_ttl_s = self.cache_ttl_s.clamp(5, 3_600);
        self.max_concurrency = self.max_concurrency.clamp(1, 16);
        self
    }
}

/// Switch engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Whether `switch_account` restarts CLI processes when the caller does
    /// not say otherwise.
    pub force_restart_default: bool,
    /// Grace period between SIGTERM and SIGKILL, in milliseconds.
    pub kill_grace_ms: u64,
    /// Timeout for the interactive `codex login` subprocess, in seconds.
    pub login_timeout_s: u64,
    /// How long to poll the live auth file for a post-login update, in
    /// seconds.
    pub login_poll_timeout_s: u64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            force_restart_default: false,
            kill_grace_ms: 2_000,
            login_timeout_s: 300,
            login_poll_timeout_s: 60,
        }
    }
}

/// Top-level configuration value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub vault_kdf: KdfParams,
    pub probe: ProbeConfig,
    pub switch: SwitchConfig,
}
