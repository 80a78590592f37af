//! Codex Switch Core Library
//!
//! This library provides the core functionality for the codex-switch account
//! manager: the encrypted credential vault, the atomic live-file switch
//! engine, the quota prober, and the persistent store that binds them.

pub mod app;
pub mod codex;
pub mod config;
pub mod crypto;
pub mod database;
pub mod platform;
pub mod quota;
pub mod switcher;
pub mod vault;

pub use app::AppContext;
pub use config::{AppConfig, ProbeConfig, SwitchConfig};
pub use crypto::{CryptoError, KdfParams, VaultKey};
pub use database::{
    Account, CliStatus, Database, QuotaDashboardItem, QuotaMode, QuotaSnapshot, QuotaState,
    RefreshPolicy, RuntimeDiagnostics, SwitchHistory, SwitchOutcome, SwitchReport,
};
pub use platform::{default_data_dir, ensure_data_dir};
pub use quota::ProbeOutcome;
pub use vault::{VaultManager, VaultState, VaultStatus};

use thiserror::Error;

/// Result type for codex-switch operations
pub type Result<T> = std::result::Result<T, CodexSwitchError>;

/// Error taxonomy surfaced across the command facade.
///
/// Every operation either completes with a value or fails with one of these
/// kinds; nothing panics across the facade boundary. [`CodexSwitchError::kind`]
/// yields the stable machine-readable label for UI consumers.
#[derive(Error, Debug)]
pub enum CodexSwitchError {
    #[error("vault is locked; unlock it first")]
    VaultLocked,

    #[error("master password is incorrect")]
    BadPassword,

    #[error("too many failed unlock attempts; retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("codex CLI not found; probed: {}", probed.join(", "))]
    CliNotFound { probed: Vec<String> },

    #[error("codex login failed: {reason}")]
    LoginFailed { reason: String },

    #[error("failed to terminate codex process {pid}: {reason}")]
    KillFailed { pid: u32, reason: String },

    #[error("switch failed: {0}")]
    SwitchFailed(String),

    #[error("history entry has no snapshot to roll back to")]
    NoSnapshot,

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodexSwitchError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VaultLocked => "VaultLocked",
            Self::BadPassword => "BadPassword",
            Self::Throttled { .. } => "Throttled",
            Self::Crypto(_) => "CryptoFailed",
            Self::NotFound(_) => "NotFound",
            Self::CliNotFound { .. } => "CliNotFound",
            Self::LoginFailed { .. } => "LoginFailed",
            Self::KillFailed { .. } => "KillFailed",
            Self::SwitchFailed(_) => "SwitchFailed",
            Self::NoSnapshot => "NoSnapshot",
            Self::Store(_) => "StoreError",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Io(_) => "IoError",
        }
    }
}

impl From<rusqlite::Error> for CodexSwitchError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(error.to_string())
    }
}
