//! Singleton rows: vault metadata and persisted settings.

use crate::crypto::KdfParams;
use crate::database::schema::now;
use crate::database::{AppSettings, Database, RefreshPolicy, VaultMeta};
use crate::Result;
use rusqlite::{params, OptionalExtension};

const SINGLETON_ID: i64 = 1;

impl Database {
    pub(crate) fn ensure_settings_row(&self) -> Result<()> {
        self.conn().execute(
            "INSERT INTO app_settings (id, updated_at) VALUES (?1, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![SINGLETON_ID, now()],
        )?;
        Ok(())
    }

    pub fn get_settings(&self) -> Result<AppSettings> {
        let settings = self.conn().query_row(
            "SELECT probe_timeout_ms, probe_cache_ttl_s, probe_max_concurrency,
                    force_restart_default, kill_grace_ms
             FROM app_settings WHERE id = ?1",
            params![SINGLETON_ID],
            |row| {
                Ok(AppSettings {
                    refresh: RefreshPolicy {
                        timeout_ms: row.get::<_, i64>(0)? as u64,
                        cache_ttl_s: row.get::<_, i64>(1)? as u64,
                        max_concurrency: row.get::<_, i64>(2)? as usize,
                    },
                    force_restart_default: row.get::<_, i64>(3)? != 0,
                    kill_grace_ms: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(settings)
    }

    pub fn set_refresh_policy(&self, policy: &RefreshPolicy) -> Result<()> {
        self.conn().execute(
            "UPDATE app_settings
             SET probe_timeout_ms = ?1, probe_cache_ttl_s = ?2,
                 probe_max_concurrency = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                policy.timeout_ms as i64,
                policy.cache_ttl_s as i64,
                policy.max_concurrency as i64,
                now(),
                SINGLETON_ID
            ],
        )?;
        Ok(())
    }

    /// Vault key-derivation metadata; `None` until the vault is initialized.
    pub fn get_vault_meta(&self) -> Result<Option<VaultMeta>> {
        let meta = self
            .conn()
            .query_row(
                "SELECT kdf_salt, kdf_mem_kib, kdf_iters, kdf_parallelism,
                        verifier_ciphertext, created_at
                 FROM vault_meta WHERE id = ?1",
                params![SINGLETON_ID],
                |row| {
                    Ok(VaultMeta {
                        kdf_salt: row.get(0)?,
                        kdf_params: KdfParams {
                            mem_kib: row.get::<_, i64>(1)? as u32,
                            iters: row.get::<_, i64>(2)? as u32,
                            parallelism: row.get::<_, i64>(3)? as u32,
                        },
                        verifier_ciphertext: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    pub fn set_vault_meta(&self, meta: &VaultMeta) -> Result<()> {
        self.conn().execute(
            "INSERT INTO vault_meta
               (id, kdf_salt, kdf_mem_kib, kdf_iters, kdf_parallelism,
                verifier_ciphertext, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                SINGLETON_ID,
                meta.kdf_salt,
                meta.kdf_params.mem_kib as i64,
                meta.kdf_params.iters as i64,
                meta.kdf_params.parallelism as i64,
                meta.verifier_ciphertext,
                meta.created_at
            ],
        )?;
        Ok(())
    }
}
