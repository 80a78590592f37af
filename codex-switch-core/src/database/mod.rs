//! Persistence layer for accounts, switch history, and quota snapshots.
//!
//! One embedded SQLite file owns every row; writers are serialized behind the
//! application context's lock and each logical operation commits in a single
//! transaction.

mod accounts;
mod history;
mod migrations;
mod models;
mod quota;
mod schema;
mod settings;

pub use migrations::CURRENT_SCHEMA_VERSION;
pub use models::{
    Account, AppSettings, CliStatus, QuotaDashboardItem, QuotaMode, QuotaSnapshot, QuotaState,
    RefreshPolicy, RuntimeDiagnostics, SwitchHistory, SwitchOutcome, SwitchReport, VaultMeta,
};
pub use schema::Database;
