//! Schema migrations.
//!
//! The schema version is tracked in SQLite's `user_version` pragma. Each
//! migration runs inside a transaction; a partially applied migration never
//! becomes visible.

use crate::Result;
use rusqlite::Connection;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_SCHEMA_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        let tx = conn.transaction()?;
        tx.execute_batch(V001_INITIAL)?;
        tx.pragma_update(None, "user_version", 1)?;
        tx.commit()?;
    }

    Ok(())
}

const V001_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS vault_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  kdf_salt BLOB NOT NULL,
  kdf_mem_kib INTEGER NOT NULL,
  kdf_iters INTEGER NOT NULL,
  kdf_parallelism INTEGER NOT NULL,
  verifier_ciphertext BLOB NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_settings (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  probe_timeout_ms INTEGER NOT NULL DEFAULT 8000,
  probe_cache_ttl_s INTEGER NOT NULL DEFAULT 60,
  probe_max_concurrency INTEGER NOT NULL DEFAULT 4,
  force_restart_default INTEGER NOT NULL DEFAULT 0,
  kill_grace_ms INTEGER NOT NULL DEFAULT 2000,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  tags_json TEXT NOT NULL,
  auth_ciphertext BLOB NOT NULL,
  auth_fingerprint TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  last_used_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_accounts_fingerprint
  ON accounts(auth_fingerprint);

CREATE TABLE IF NOT EXISTS switch_history (
  id TEXT PRIMARY KEY,
  from_account_id TEXT REFERENCES accounts(id) ON DELETE SET NULL,
  to_account_id TEXT REFERENCES accounts(id) ON DELETE RESTRICT,
  snapshot_path TEXT,
  result TEXT NOT NULL CHECK (result IN ('success', 'failed', 'rolled_back')),
  error_message TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_switch_history_created
  ON switch_history(created_at DESC);

CREATE TABLE IF NOT EXISTS quota_snapshots (
  id TEXT PRIMARY KEY,
  account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
  mode TEXT NOT NULL CHECK (mode IN ('precise', 'status', 'unknown')),
  remaining_value REAL,
  remaining_unit TEXT,
  quota_state TEXT NOT NULL
    CHECK (quota_state IN ('available', 'near_limit', 'exhausted', 'unknown')),
  reset_at TEXT,
  source TEXT NOT NULL,
  confidence INTEGER NOT NULL,
  reason TEXT,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quota_snapshots_account_created
  ON quota_snapshots(account_id, created_at DESC);
"#;
