//! Quota snapshot rows. Append-only, pruned by TTL.

use crate::database::schema::now;
use crate::database::{Database, QuotaMode, QuotaSnapshot, QuotaState};
use crate::quota::ProbeOutcome;
use crate::Result;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn map_snapshot(row: &Row<'_>) -> rusqlite::Result<QuotaSnapshot> {
    let mode_raw: String = row.get(2)?;
    let state_raw: String = row.get(5)?;
    Ok(QuotaSnapshot {
        id: row.get(0)?,
        account_id: row.get(1)?,
        mode: QuotaMode::parse(&mode_raw).unwrap_or(QuotaMode::Unknown),
        remaining_value: row.get(3)?,
        remaining_unit: row.get(4)?,
        quota_state: QuotaState::parse(&state_raw).unwrap_or(QuotaState::Unknown),
        reset_at: row.get(6)?,
        source: row.get(7)?,
        confidence: row.get(8)?,
        reason: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const SNAPSHOT_COLUMNS: &str = "id, account_id, mode, remaining_value, remaining_unit, \
     quota_state, reset_at, source, confidence, reason, created_at";

impl Database {
    /// Persist one probe outcome as a snapshot row.
    pub fn save_quota_snapshot(
        &self,
        account_id: &str,
        outcome: &ProbeOutcome,
    ) -> Result<QuotaSnapshot> {
        let id = Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO quota_snapshots
               (id, account_id, mode, remaining_value, remaining_unit, quota_state,
                reset_at, source, confidence, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                account_id,
                outcome.mode.as_str(),
                outcome.remaining_value,
                outcome.remaining_unit,
                outcome.quota_state.as_str(),
                outcome.reset_at,
                outcome.source,
                outcome.confidence,
                outcome.reason,
                now()
            ],
        )?;
        self.get_quota_snapshot(&id)?.ok_or_else(|| {
            crate::CodexSwitchError::Store("snapshot missing after insert".to_string())
        })
    }

    pub fn get_quota_snapshot(&self, id: &str) -> Result<Option<QuotaSnapshot>> {
        let snapshot = self
            .conn()
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM quota_snapshots WHERE id = ?1"),
                params![id],
                map_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    pub fn latest_quota_by_account(&self, account_id: &str) -> Result<Option<QuotaSnapshot>> {
        let snapshot = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM quota_snapshots
                     WHERE account_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![account_id],
                map_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    pub fn list_quota_snapshots(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<QuotaSnapshot>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM quota_snapshots
             WHERE account_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![account_id, limit as i64], map_snapshot)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    /// Latest snapshot per account, for the dashboard.
    pub fn list_latest_quota_snapshots(&self) -> Result<Vec<QuotaSnapshot>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM quota_snapshots
             WHERE rowid IN (
               SELECT MAX(rowid) FROM quota_snapshots GROUP BY account_id
             )"
        ))?;
        let rows = stmt.query_map([], map_snapshot)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    /// Delete snapshots older than the RFC3339 cutoff. Returns rows removed.
    pub fn prune_quota_snapshots(&self, cutoff: &str) -> Result<usize> {
        let removed = self.conn().execute(
            "DELETE FROM quota_snapshots WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}
