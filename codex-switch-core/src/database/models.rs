//! Row types and facade result types.

use serde::{Deserialize, Serialize};

/// A registered account. The credential itself is stored encrypted and is
/// never part of this view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    /// First 16 hex chars of SHA-256 over the canonical auth JSON.
    pub auth_fingerprint: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_used_at: Option<String>,
}

/// Outcome recorded for a switch-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchOutcome {
    Success,
    Failed,
    RolledBack,
}

impl SwitchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

/// Append-only record of a live-file replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchHistory {
    pub id: String,
    pub from_account_id: Option<String>,
    /// Rolled-back rows may target an account the store never knew.
    pub to_account_id: Option<String>,
    pub snapshot_path: Option<String>,
    pub result: SwitchOutcome,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Facade result of a switch or rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchReport {
    pub success: bool,
    pub history_id: String,
    pub snapshot_path: Option<String>,
    /// CLI processes terminated as part of a forced restart.
    pub terminated_processes: usize,
}

/// Whether a quota figure is a parsed number, a coarse state label, or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaMode {
    Precise,
    Status,
    Unknown,
}

impl QuotaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precise => "precise",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "precise" => Some(Self::Precise),
            "status" => Some(Self::Status),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Coarse remaining-allowance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaState {
    Available,
    NearLimit,
    Exhausted,
    Unknown,
}

impl QuotaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::NearLimit => "near_limit",
            Self::Exhausted => "exhausted",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "available" => Some(Self::Available),
            "near_limit" => Some(Self::NearLimit),
            "exhausted" => Some(Self::Exhausted),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Sort rank for the dashboard: healthy accounts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Available => 0,
            Self::NearLimit => 1,
            Self::Exhausted => 2,
            Self::Unknown => 3,
        }
    }
}

/// One stored quota observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub id: String,
    pub account_id: String,
    pub mode: QuotaMode,
    pub remaining_value: Option<f64>,
    pub remaining_unit: Option<String>,
    pub quota_state: QuotaState,
    pub reset_at: Option<String>,
    /// Short label naming the probe path that produced the row.
    pub source: String,
    pub confidence: i64,
    pub reason: Option<String>,
    pub created_at: String,
}

/// Dashboard line: an account paired with its latest snapshot, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaDashboardItem {
    pub account: Account,
    pub snapshot: Option<QuotaSnapshot>,
}

/// Vault key-derivation metadata (single row).
#[derive(Debug, Clone)]
pub struct VaultMeta {
    pub kdf_salt: Vec<u8>,
    pub kdf_params: crate::crypto::KdfParams,
    pub verifier_ciphertext: Vec<u8>,
    pub created_at: String,
}

/// Tunable quota refresh policy, persisted in the settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPolicy {
    pub timeout_ms: u64,
    pub cache_ttl_s: u64,
    pub max_concurrency: usize,
}

/// Persisted settings row.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub refresh: RefreshPolicy,
    pub force_restart_default: bool,
    pub kill_grace_ms: u64,
}

/// Facade diagnostics payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDiagnostics {
    pub auth_file_path: String,
    pub auth_file_exists: bool,
    pub app_data_dir: String,
    pub db_path: String,
    pub schema_version: i64,
    pub cli_process_count: usize,
}

/// Facade CLI process status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliStatus {
    pub running: bool,
    pub process_count: usize,
    pub checked_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_roundtrip() {
        for outcome in [
            SwitchOutcome::Success,
            SwitchOutcome::Failed,
            SwitchOutcome::RolledBack,
        ] {
            assert_eq!(SwitchOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(SwitchOutcome::parse("bogus"), None);
    }

    #[test]
    fn quota_labels_roundtrip() {
        for mode in [QuotaMode::Precise, QuotaMode::Status, QuotaMode::Unknown] {
            assert_eq!(QuotaMode::parse(mode.as_str()), Some(mode));
        }
        for state in [
            QuotaState::Available,
            QuotaState::NearLimit,
            QuotaState::Exhausted,
            QuotaState::Unknown,
        ] {
            assert_eq!(QuotaState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn dashboard_rank_orders_healthy_first() {
        assert!(QuotaState::Available.rank() < QuotaState::NearLimit.rank());
        assert!(QuotaState::NearLimit.rank() < QuotaState::Exhausted.rank());
        assert!(QuotaState::Exhausted.rank() < QuotaState::Unknown.rank());
    }
}
