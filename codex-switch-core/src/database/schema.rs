//! Database connection management.
//!
//! [`Database`] owns a [`rusqlite::Connection`] and guarantees that pragmas
//! and migrations have run before any other operation touches the file.

use crate::database::migrations;
use crate::Result;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&mut conn)?;

        let db = Self { conn };
        db.ensure_settings_row()?;
        Ok(db)
    }

    /// Open an on-disk database in a temp location for testing.
    #[cfg(test)]
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        Self::open(dir.join("codex-switch.db"))
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Current schema version from the `user_version` pragma.
    pub fn schema_version(&self) -> Result<i64> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }
}

/// Current timestamp in the RFC3339 form stored throughout the schema.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}
