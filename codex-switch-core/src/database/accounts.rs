//! Account rows.

use crate::database::schema::now;
use crate::database::{Account, Database};
use crate::{CodexSwitchError, Result};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn map_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    let tags_json: String = row.get(2)?;
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        auth_fingerprint: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        last_used_at: row.get(6)?,
    })
}

const ACCOUNT_COLUMNS: &str =
    "id, name, tags_json, auth_fingerprint, created_at, updated_at, last_used_at";

impl Database {
    /// Insert a new account and return the stored row.
    pub fn create_account(
        &self,
        name: &str,
        tags: &[String],
        auth_ciphertext: &[u8],
        fingerprint: &str,
    ) -> Result<Account> {
        let id = Uuid::new_v4().to_string();
        let timestamp = now();
        self.conn().execute(
            "INSERT INTO accounts
               (id, name, tags_json, auth_ciphertext, auth_fingerprint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                name.trim(),
                serde_json::to_string(tags)
                    .map_err(|error| CodexSwitchError::Store(error.to_string()))?,
                auth_ciphertext,
                fingerprint,
                timestamp,
                timestamp
            ],
        )?;
        self.get_account(&id)?
            .ok_or_else(|| CodexSwitchError::Store("account missing after insert".to_string()))
    }

    pub fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let account = self
            .conn()
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
                map_account,
            )
            .optional()?;
        Ok(account)
    }

    /// Fetch an account together with its encrypted credential blob.
    pub fn get_account_with_secret(&self, id: &str) -> Result<Option<(Account, Vec<u8>)>> {
        let result = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS}, auth_ciphertext FROM accounts WHERE id = ?1"
                ),
                params![id],
                |row| {
                    let account = map_account(row)?;
                    let ciphertext: Vec<u8> = row.get(7)?;
                    Ok((account, ciphertext))
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn find_account_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Account>> {
        let account = self
            .conn()
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE auth_fingerprint = ?1"),
                params![fingerprint],
                map_account,
            )
            .optional()?;
        Ok(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map([], map_account)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    pub fn update_account_meta(&self, id: &str, name: &str, tags: &[String]) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE accounts SET name = ?1, tags_json = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                name.trim(),
                serde_json::to_string(tags)
                    .map_err(|error| CodexSwitchError::Store(error.to_string()))?,
                now(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(CodexSwitchError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    pub fn delete_account(&self, id: &str) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CodexSwitchError::NotFound(format!("account {id}")));
        }
        Ok(())
    }
}
