//! Switch-history rows. Append-only.

use crate::database::schema::now;
use crate::database::{Database, SwitchHistory, SwitchOutcome};
use crate::Result;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

fn map_history(row: &Row<'_>) -> rusqlite::Result<SwitchHistory> {
    let result_raw: String = row.get(4)?;
    Ok(SwitchHistory {
        id: row.get(0)?,
        from_account_id: row.get(1)?,
        to_account_id: row.get(2)?,
        snapshot_path: row.get(3)?,
        result: SwitchOutcome::parse(&result_raw).unwrap_or(SwitchOutcome::Failed),
        error_message: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const HISTORY_COLUMNS: &str =
    "id, from_account_id, to_account_id, snapshot_path, result, error_message, created_at";

impl Database {
    /// Append a history row; for successful switches the target account's
    /// `last_used_at` is advanced in the same transaction.
    pub fn record_switch(
        &mut self,
        from_account_id: Option<&str>,
        to_account_id: Option<&str>,
        snapshot_path: Option<&Path>,
        result: SwitchOutcome,
        error_message: Option<&str>,
    ) -> Result<SwitchHistory> {
        let id = Uuid::new_v4().to_string();
        let timestamp = now();

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO switch_history
               (id, from_account_id, to_account_id, snapshot_path, result, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                from_account_id,
                to_account_id,
                snapshot_path.map(|path| path.display().to_string()),
                result.as_str(),
                error_message,
                timestamp
            ],
        )?;
        if result == SwitchOutcome::Success {
            if let Some(account_id) = to_account_id {
                tx.execute(
                    "UPDATE accounts SET last_used_at = ?1, updated_at = ?1 WHERE id = ?2",
                    params![timestamp, account_id],
                )?;
            }
        }
        tx.commit()?;

        self.get_switch_history(&id)?.ok_or_else(|| {
            crate::CodexSwitchError::Store("history missing after insert".to_string())
        })
    }

    pub fn get_switch_history(&self, id: &str) -> Result<Option<SwitchHistory>> {
        let history = self
            .conn()
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM switch_history WHERE id = ?1"),
                params![id],
                map_history,
            )
            .optional()?;
        Ok(history)
    }

    pub fn list_switch_history(&self, limit: usize) -> Result<Vec<SwitchHistory>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM switch_history
             ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], map_history)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// The account the live file currently corresponds to: the target of the
    /// most recent switch or rollback that actually replaced the file.
    pub fn current_account_id(&self) -> Result<Option<String>> {
        let id: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT to_account_id FROM switch_history
                 WHERE result IN ('success', 'rolled_back')
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db_with_accounts() -> (TempDir, Database, String, String) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_dir(dir.path()).unwrap();
        let a = db.create_account("A", &[], b"ct-a", "aaaaaaaaaaaaaaaa").unwrap();
        let b = db.create_account("B", &[], b"ct-b", "bbbbbbbbbbbbbbbb").unwrap();
        (dir, db, a.id, b.id)
    }

    #[test]
    fn success_row_advances_last_used_at() {
        let (_dir, mut db, a, b) = open_db_with_accounts();

        let row = db
            .record_switch(Some(&a), Some(&b), None, SwitchOutcome::Success, None)
            .unwrap();
        assert_eq!(row.result, SwitchOutcome::Success);
        assert_eq!(row.to_account_id.as_deref(), Some(b.as_str()));

        let target = db.get_account(&b).unwrap().unwrap();
        assert!(target.last_used_at.is_some());

        let source = db.get_account(&a).unwrap().unwrap();
        assert!(source.last_used_at.is_none());
    }

    #[test]
    fn failed_row_does_not_touch_accounts() {
        let (_dir, mut db, _a, b) = open_db_with_accounts();

        db.record_switch(None, Some(&b), None, SwitchOutcome::Failed, Some("boom"))
            .unwrap();
        let target = db.get_account(&b).unwrap().unwrap();
        assert!(target.last_used_at.is_none());
    }

    #[test]
    fn current_account_skips_failed_rows() {
        let (_dir, mut db, a, b) = open_db_with_accounts();
        assert!(db.current_account_id().unwrap().is_none());

        db.record_switch(None, Some(&a), None, SwitchOutcome::Success, None)
            .unwrap();
        db.record_switch(Some(&a), Some(&b), None, SwitchOutcome::Failed, Some("x"))
            .unwrap();
        assert_eq!(db.current_account_id().unwrap(), Some(a.clone()));

        db.record_switch(Some(&a), Some(&b), None, SwitchOutcome::Success, None)
            .unwrap();
        assert_eq!(db.current_account_id().unwrap(), Some(b));
    }

    #[test]
    fn delete_of_switched_to_account_is_restricted() {
        let (_dir, mut db, a, b) = open_db_with_accounts();
        db.record_switch(Some(&a), Some(&b), None, SwitchOutcome::Success, None)
            .unwrap();

        // to_account_id is RESTRICT: the referenced account cannot go away.
        assert!(db.delete_account(&b).is_err());

        // from_account_id is SET NULL: deleting the source keeps the row.
        db.delete_account(&a).unwrap();
        let rows = db.list_switch_history(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].from_account_id.is_none());
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let (_dir, mut db, a, b) = open_db_with_accounts();
        for _ in 0..3 {
            db.record_switch(Some(&a), Some(&b), None, SwitchOutcome::Success, None)
                .unwrap();
        }
        assert_eq!(db.list_switch_history(2).unwrap().len(), 2);
        assert_eq!(db.list_switch_history(10).unwrap().len(), 3);
    }
}
