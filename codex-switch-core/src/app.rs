//! Application context and command facade.
//!
//! One [`AppContext`] is constructed at startup and threaded through every
//! operation; the locks live inside it. The facade is re-entrant: switches
//! and rollbacks serialize on the context's switch lock, database writers on
//! the store lock, probes on the semaphore.

use crate::codex::{
    self, auth_file::parse_auth_json, extract_access_token, CliLocator,
};
use crate::config::{AppConfig, ProbeConfig};
use crate::crypto;
use crate::database::{
    Account, CliStatus, Database, QuotaDashboardItem, QuotaSnapshot, RefreshPolicy,
    RuntimeDiagnostics, SwitchHistory, SwitchOutcome, SwitchReport,
};
use crate::quota::{self, ProbeOutcome};
use crate::switcher;
use crate::vault::{VaultManager, VaultState, VaultStatus};
use crate::{platform, CodexSwitchError, Result};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Semaphore;
use zeroize::Zeroize;

const AUTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Application context: stores, vault, CLI adapter, configuration.
pub struct AppContext {
    data_dir: PathBuf,
    db_path: PathBuf,
    snapshots_dir: PathBuf,
    auth_path: PathBuf,
    db: Arc<Mutex<Database>>,
    vault: VaultManager,
    locator: CliLocator,
    config: RwLock<AppConfig>,
    /// Total order over switch and rollback; at most one in progress.
    switch_lock: Mutex<()>,
    probe_limiter: RwLock<Arc<Semaphore>>,
}

impl AppContext {
    /// Open the context against the default live auth file location.
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        let auth_path = platform::default_auth_file_path().ok_or_else(|| {
            CodexSwitchError::InvalidInput("cannot locate the user home directory".to_string())
        })?;
        Self::open_with(data_dir, auth_path)
    }

    /// Open the context with an explicit live auth file path.
    pub fn open_with(data_dir: PathBuf, auth_path: PathBuf) -> Result<Self> {
        platform::ensure_data_dir(&data_dir)?;
        let db_path = platform::db_path(&data_dir);
        let snapshots_dir = platform::snapshots_dir(&data_dir);

        let db = Database::open(&db_path)?;
        let settings = db.get_settings()?;

        let mut config = AppConfig::default();
        config.probe.timeout_ms = settings.refresh.timeout_ms;
        config.probe.cache_ttl_s = settings.refresh.cache_ttl_s;
        config.probe.max_concurrency = settings.refresh.max_concurrency;
        config.switch.force_restart_default = settings.force_restart_default;
        config.switch.kill_grace_ms = settings.kill_grace_ms;
        let config = config;

        let limiter = Arc::new(Semaphore::new(config.probe.max_concurrency));
        let db = Arc::new(Mutex::new(db));
        let vault = VaultManager::new(db.clone());

        tracing::info!(data_dir = %data_dir.display(), "application context opened");

        Ok(Self {
            data_dir,
            db_path,
            snapshots_dir,
            auth_path,
            db,
            vault,
            locator: CliLocator::new(),
            config: RwLock::new(config),
            switch_lock: Mutex::new(()),
            probe_limiter: RwLock::new(limiter),
        })
    }

    pub fn auth_path(&self) -> &Path {
        &self.auth_path
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| CodexSwitchError::Store("database lock poisoned".to_string()))
    }

    fn probe_config(&self) -> Result<ProbeConfig> {
        let config = self
            .config
            .read()
            .map_err(|_| CodexSwitchError::Store("config lock poisoned".to_string()))?;
        Ok(config.probe.clone())
    }

    // --- Vault operations ---

    pub fn init_vault(&self, master_password: &str) -> Result<VaultStatus> {
        let kdf = {
            let config = self
                .config
                .read()
                .map_err(|_| CodexSwitchError::Store("config lock poisoned".to_string()))?;
            config.vault_kdf.clone()
        };
        self.vault.init(master_password, &kdf)?;
        self.vault.status()
    }

    pub fn unlock_vault(&self, master_password: &str) -> Result<VaultStatus> {
        self.vault.unlock(master_password)?;
        self.vault.status()
    }

    pub fn lock_vault(&self) -> Result<VaultStatus> {
        self.vault.lock()?;
        self.vault.status()
    }

    pub fn vault_status(&self) -> Result<VaultStatus> {
        self.vault.status()
    }

    // --- Account operations ---

    /// Import the current live auth file as a new account.
    pub fn import_current(&self, name: &str, tags: Vec<String>) -> Result<Account> {
        if !self.auth_path.exists() {
            return Err(CodexSwitchError::NotFound(format!(
                "live auth file {} does not exist",
                self.auth_path.display()
            )));
        }
        let text = fs::read_to_string(&self.auth_path)?;
        self.import_auth_text(name, tags, &text)
    }

    /// Import an auth file from an arbitrary path.
    pub fn import_from_file(&self, path: &Path, name: &str, tags: Vec<String>) -> Result<Account> {
        let text = fs::read_to_string(path).map_err(|error| {
            CodexSwitchError::InvalidInput(format!("cannot read {}: {error}", path.display()))
        })?;
        self.import_auth_text(name, tags, &text)
    }

    /// Drive the CLI login flow, wait for the live file to change, then
    /// import the fresh credential.
    pub async fn import_via_login(&self, name: &str, tags: Vec<String>) -> Result<Account> {
        if self.vault.state()? != VaultState::Unlocked {
            return Err(CodexSwitchError::VaultLocked);
        }

        let cli = self.locator.locate()?;
        let (login_timeout, poll_timeout) = {
            let config = self
                .config
                .read()
                .map_err(|_| CodexSwitchError::Store("config lock poisoned".to_string()))?;
            (
                Duration::from_secs(config.switch.login_timeout_s),
                Duration::from_secs(config.switch.login_poll_timeout_s),
            )
        };

        let pre_mtime = fs::metadata(&self.auth_path)
            .ok()
            .and_then(|metadata| metadata.modified().ok());

        let login_cli = cli.clone();
        tokio::task::spawn_blocking(move || codex::run_login(&login_cli, login_timeout))
            .await
            .map_err(|error| CodexSwitchError::LoginFailed {
                reason: format!("login task aborted: {error}"),
            })??;

        let text = self.wait_for_auth_update(pre_mtime, poll_timeout).await?;
        self.import_auth_text(name, tags, &text)
    }

    async fn wait_for_auth_update(
        &self,
        pre_mtime: Option<SystemTime>,
        timeout: Duration,
    ) -> Result<String> {
        let started = Instant::now();
        loop {
            if let Ok(metadata) = fs::metadata(&self.auth_path) {
                let advanced = match (pre_mtime, metadata.modified().ok()) {
                    (Some(pre), Some(current)) => current > pre,
                    (None, Some(_)) => true,
                    _ => false,
                };
                if advanced {
                    if let Ok(text) = fs::read_to_string(&self.auth_path) {
                        if parse_auth_json(&text).is_ok() {
                            return Ok(text);
                        }
                    }
                }
            }

            if started.elapsed() >= timeout {
                return Err(CodexSwitchError::LoginFailed {
                    reason: format!(
                        "live auth file did not update within {}s of login",
                        timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(AUTH_POLL_INTERVAL).await;
        }
    }

    fn import_auth_text(&self, name: &str, tags: Vec<String>, text: &str) -> Result<Account> {
        let value = parse_auth_json(text)?;
        let fingerprint = crypto::fingerprint_json(&value)?;

        if let Some(existing) = self.db()?.find_account_by_fingerprint(&fingerprint)? {
            return Err(CodexSwitchError::InvalidInput(format!(
                "credential already imported as account \"{}\"",
                existing.name
            )));
        }

        let ciphertext = self.vault.wrap(text.as_bytes())?;
        let account = self.db()?.create_account(
            &ensure_name(name, &fingerprint),
            &unique_tags(tags),
            &ciphertext,
            &fingerprint,
        )?;
        tracing::info!(account = %account.id, fingerprint = %fingerprint, "account imported");
        Ok(account)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.db()?.list_accounts()
    }

    pub fn update_account_meta(&self, id: &str, name: &str, tags: Vec<String>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(CodexSwitchError::InvalidInput(
                "account name must not be empty".to_string(),
            ));
        }
        self.db()?
            .update_account_meta(id.trim(), name, &unique_tags(tags))
    }

    pub fn delete_account(&self, id: &str) -> Result<()> {
        self.db()?.delete_account(id.trim())
    }

    // --- Switch operations ---

    /// Replace the live auth file with the decrypted credential of `id`.
    pub fn switch_account(&self, id: &str, force_restart: bool) -> Result<SwitchReport> {
        let _serialized = self
            .switch_lock
            .lock()
            .map_err(|_| CodexSwitchError::Store("switch lock poisoned".to_string()))?;

        let (account, ciphertext) = self
            .db()?
            .get_account_with_secret(id.trim())?
            .ok_or_else(|| CodexSwitchError::NotFound(format!("account {id}")))?;

        let mut plaintext = self.vault.unwrap_blob(&ciphertext)?;
        let from_account = self.db()?.current_account_id()?;

        let snapshot_path = match switcher::create_snapshot(&self.auth_path, &self.snapshots_dir) {
            Ok(path) => path,
            Err(error) => {
                plaintext.zeroize();
                let message = format!("snapshot failed: {error}");
                self.db()?.record_switch(
                    from_account.as_deref(),
                    Some(&account.id),
                    None,
                    SwitchOutcome::Failed,
                    Some(&message),
                )?;
                return Err(CodexSwitchError::SwitchFailed(message));
            }
        };

        if let Err(error) = switcher::atomic_replace(&self.auth_path, &plaintext) {
            plaintext.zeroize();
            let message = format!("replace failed: {error}");
            self.db()?.record_switch(
                from_account.as_deref(),
                Some(&account.id),
                snapshot_path.as_deref(),
                SwitchOutcome::Failed,
                Some(&message),
            )?;
            tracing::warn!(account = %account.id, %message, "switch failed, live file untouched");
            return Err(CodexSwitchError::SwitchFailed(message));
        }
        plaintext.zeroize();

        // Write first, kill after: the new credential must already be in
        // place when the CLI comes back.
        let mut terminated = 0;
        if force_restart {
            let grace = {
                let config = self
                    .config
                    .read()
                    .map_err(|_| CodexSwitchError::Store("config lock poisoned".to_string()))?;
                Duration::from_millis(config.switch.kill_grace_ms)
            };
            let located = self.locator.cached().map(|cli| cli.program);
            match codex::terminate_cli_processes(located.as_deref(), grace) {
                Ok(count) => terminated = count,
                Err(error) => {
                    tracing::warn!(error = %error, "failed to terminate codex CLI processes");
                }
            }
        }

        let history = self.db()?.record_switch(
            from_account.as_deref(),
            Some(&account.id),
            snapshot_path.as_deref(),
            SwitchOutcome::Success,
            None,
        )?;
        tracing::info!(
            from = from_account.as_deref().unwrap_or("<none>"),
            to = %account.id,
            terminated,
            "switched live auth file"
        );

        Ok(SwitchReport {
            success: true,
            history_id: history.id,
            snapshot_path: history.snapshot_path,
            terminated_processes: terminated,
        })
    }

    /// Restore the live auth file from the snapshot of an earlier switch.
    pub fn rollback(&self, history_id: &str) -> Result<SwitchReport> {
        let _serialized = self
            .switch_lock
            .lock()
            .map_err(|_| CodexSwitchError::Store("switch lock poisoned".to_string()))?;

        let row = self
            .db()?
            .get_switch_history(history_id.trim())?
            .ok_or_else(|| CodexSwitchError::NotFound(format!("history entry {history_id}")))?;
        let snapshot_path = row
            .snapshot_path
            .as_ref()
            .map(PathBuf::from)
            .ok_or(CodexSwitchError::NoSnapshot)?;
        if !snapshot_path.exists() {
            return Err(CodexSwitchError::NoSnapshot);
        }

        let content = fs::read(&snapshot_path)?;
        let pre_rollback = switcher::create_snapshot(&self.auth_path, &self.snapshots_dir)?;

        if let Err(error) = switcher::atomic_replace(&self.auth_path, &content) {
            let message = format!("replace failed: {error}");
            self.db()?.record_switch(
                row.to_account_id.as_deref(),
                row.from_account_id.as_deref(),
                pre_rollback.as_deref(),
                SwitchOutcome::Failed,
                Some(&message),
            )?;
            return Err(CodexSwitchError::SwitchFailed(message));
        }

        // The referenced snapshot is kept; older rollbacks stay replayable.
        let history = self.db()?.record_switch(
            row.to_account_id.as_deref(),
            row.from_account_id.as_deref(),
            pre_rollback.as_deref(),
            SwitchOutcome::RolledBack,
            None,
        )?;
        tracing::info!(history = %history.id, snapshot = %snapshot_path.display(), "rolled back live auth file");

        Ok(SwitchReport {
            success: true,
            history_id: history.id,
            snapshot_path: history.snapshot_path,
            terminated_processes: 0,
        })
    }

    pub fn list_history(&self, limit: usize) -> Result<Vec<SwitchHistory>> {
        self.db()?.list_switch_history(limit)
    }

    // --- Quota operations ---

    /// Refresh quota snapshots for one account, or for every account.
    ///
    /// Probe failures degrade to `unknown` snapshots; the refresh itself only
    /// fails on vault/store errors.
    pub async fn refresh_quota(
        &self,
        account_id: Option<&str>,
        force: bool,
    ) -> Result<Vec<QuotaSnapshot>> {
        if self.vault.state()? != VaultState::Unlocked {
            return Err(CodexSwitchError::VaultLocked);
        }

        let targets: Vec<(Account, Vec<u8>)> = {
            let db = self.db()?;
            match account_id {
                Some(id) => {
                    let target = db
                        .get_account_with_secret(id.trim())?
                        .ok_or_else(|| CodexSwitchError::NotFound(format!("account {id}")))?;
                    vec![target]
                }
                None => {
                    let mut all = Vec::new();
                    for account in db.list_accounts()? {
                        if let Some(target) = db.get_account_with_secret(&account.id)? {
                            all.push(target);
                        }
                    }
                    all
                }
            }
        };

        let probe_config = self.probe_config()?;
        let client = quota::build_client(probe_config.timeout_ms)?;
        let limiter = self
            .probe_limiter
            .read()
            .map_err(|_| CodexSwitchError::Store("limiter lock poisoned".to_string()))?
            .clone();

        let client = &client;
        let probe_config = &probe_config;
        let refreshes = targets.into_iter().map(|(account, ciphertext)| {
            let limiter = limiter.clone();
            async move {
                if !force {
                    let cached = self.db()?.latest_quota_by_account(&account.id)?;
                    if let Some(existing) = cached {
                        if snapshot_age_secs(&existing.created_at)
                            .is_some_and(|age| age <= probe_config.cache_ttl_s)
                        {
                            return Ok(existing);
                        }
                    }
                }

                let _permit = limiter.acquire().await.map_err(|_| {
                    CodexSwitchError::Store("probe limiter closed".to_string())
                })?;

                let outcome = self
                    .probe_one(&ciphertext, client, probe_config)
                    .await;
                if outcome.mode == crate::database::QuotaMode::Unknown {
                    tracing::warn!(
                        account = %account.id,
                        reason = outcome.reason.as_deref().unwrap_or("unknown"),
                        "quota probe degraded"
                    );
                }
                self.db()?.save_quota_snapshot(&account.id, &outcome)
            }
        });

        futures::future::join_all(refreshes)
            .await
            .into_iter()
            .collect()
    }

    async fn probe_one(
        &self,
        ciphertext: &[u8],
        client: &reqwest::Client,
        probe_config: &ProbeConfig,
    ) -> ProbeOutcome {
        let mut plaintext = match self.vault.unwrap_blob(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                return ProbeOutcome::unknown(&format!("credential_unavailable:{}", error.kind()), "none")
            }
        };
        let token = serde_json::from_slice::<serde_json::Value>(&plaintext)
            .ok()
            .as_ref()
            .and_then(extract_access_token);
        plaintext.zeroize();

        match token {
            Some(token) => quota::probe_account(client, &token, probe_config).await,
            None => ProbeOutcome::unknown("missing_access_token", "none"),
        }
    }

    /// Every account paired with its latest snapshot, healthiest first.
    pub fn quota_dashboard(&self) -> Result<Vec<QuotaDashboardItem>> {
        let db = self.db()?;
        let accounts = db.list_accounts()?;
        let mut latest: std::collections::HashMap<String, QuotaSnapshot> = db
            .list_latest_quota_snapshots()?
            .into_iter()
            .map(|snapshot| (snapshot.account_id.clone(), snapshot))
            .collect();

        let mut dashboard: Vec<QuotaDashboardItem> = accounts
            .into_iter()
            .map(|account| {
                let snapshot = latest.remove(&account.id);
                QuotaDashboardItem { account, snapshot }
            })
            .collect();
        dashboard.sort_by_key(|item| {
            (
                item.snapshot
                    .as_ref()
                    .map(|snapshot| snapshot.quota_state.rank())
                    .unwrap_or(u8::MAX),
                item.account.name.clone(),
            )
        });
        Ok(dashboard)
    }

    pub fn list_snapshots(&self, account_id: &str, limit: usize) -> Result<Vec<QuotaSnapshot>> {
        let db = self.db()?;
        if db.get_account(account_id.trim())?.is_none() {
            return Err(CodexSwitchError::NotFound(format!("account {account_id}")));
        }
        db.list_quota_snapshots(account_id.trim(), limit)
    }

    /// Update the persisted refresh policy and the running limiter.
    pub fn set_refresh_policy(&self, policy: RefreshPolicy) -> Result<RefreshPolicy> {
        let clamped = {
            let current = self.probe_config()?;
            ProbeConfig {
                timeout_ms: policy.timeout_ms,
                cache_ttl_s: policy.cache_ttl_s,
                max_concurrency: policy.max_concurrency,
                ..current
            }
            .clamped()
        };
        let applied = RefreshPolicy {
            timeout_ms: clamped.timeout_ms,
            cache_ttl_s: clamped.cache_ttl_s,
            max_concurrency: clamped.max_concurrency,
        };

        self.db()?.set_refresh_policy(&applied)?;
        {
            let mut config = self
                .config
                .write()
                .map_err(|_| CodexSwitchError::Store("config lock poisoned".to_string()))?;
            config.probe = clamped;
        }
        {
            let mut limiter = self
                .probe_limiter
                .write()
                .map_err(|_| CodexSwitchError::Store("limiter lock poisoned".to_string()))?;
            *limiter = Arc::new(Semaphore::new(applied.max_concurrency));
        }
        Ok(applied)
    }

    // --- Diagnostics ---

    pub fn get_runtime_diagnostics(&self) -> Result<RuntimeDiagnostics> {
        let located = self.locator.cached().map(|cli| cli.program);
        Ok(RuntimeDiagnostics {
            auth_file_path: self.auth_path.display().to_string(),
            auth_file_exists: self.auth_path.exists(),
            app_data_dir: self.data_dir.display().to_string(),
            db_path: self.db_path.display().to_string(),
            schema_version: self.db()?.schema_version()?,
            cli_process_count: codex::count_cli_processes(located.as_deref()),
        })
    }

    pub fn get_cli_status(&self) -> Result<CliStatus> {
        let located = self.locator.cached().map(|cli| cli.program);
        let process_count = codex::count_cli_processes(located.as_deref());
        Ok(CliStatus {
            running: process_count > 0,
            process_count,
            checked_at: Utc::now().to_rfc3339(),
        })
    }
}

/// Age of an RFC3339 timestamp in whole seconds; `None` when unparsable or
/// in the future beyond clock skew.
fn snapshot_age_secs(created_at: &str) -> Option<u64> {
    let created = chrono::DateTime::parse_from_rfc3339(created_at).ok()?;
    let age = Utc::now().signed_duration_since(created.with_timezone(&Utc));
    u64::try_from(age.num_seconds()).ok()
}

/// Caller-provided name, or `Account-<fingerprint[:8]>` when empty.
fn ensure_name(name: &str, fingerprint: &str) -> String {
    let trimmed = name.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    let prefix: String = fingerprint.chars().take(8).collect();
    format!("Account-{prefix}")
}

/// Trim, drop empties, and deduplicate while keeping first-seen order.
fn unique_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::QuotaMode;
    use tempfile::TempDir;

    const PASSWORD: &str = "hunter22!";

    fn open_context() -> (TempDir, AppContext) {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let auth_path = dir.path().join("home").join(".codex").join("auth.json");
        let ctx = AppContext::open_with(data_dir, auth_path).unwrap();
        (dir, ctx)
    }

    fn open_unlocked_context() -> (TempDir, AppContext) {
        let (dir, ctx) = open_context();
        ctx.init_vault(PASSWORD).unwrap();
        (dir, ctx)
    }

    fn write_auth_file(dir: &TempDir, name: &str, token: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(
            &path,
            format!(r#"{{"tokens":{{"access_token":"{token}"}}}}"#),
        )
        .unwrap();
        path
    }

    #[test]
    fn helper_ensure_name_defaults_to_fingerprint() {
        assert_eq!(ensure_name("  Work  ", "deadbeefcafebabe"), "Work");
        assert_eq!(ensure_name("   ", "deadbeefcafebabe"), "Account-deadbeef");
    }

    #[test]
    fn helper_unique_tags_trims_and_dedupes() {
        let tags = vec![
            " a ".to_string(),
            "b".to_string(),
            "a".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(unique_tags(tags), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn import_from_file_computes_fingerprint_over_canonical_json() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "xyz");

        let account = ctx.import_from_file(&path, "", Vec::new()).unwrap();
        let expected = crypto::fingerprint_text(r#"{"tokens":{"access_token":"xyz"}}"#).unwrap();
        assert_eq!(account.auth_fingerprint, expected);
        assert_eq!(account.name, format!("Account-{}", &expected[..8]));
    }

    #[test]
    fn duplicate_import_is_rejected() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "xyz");

        ctx.import_from_file(&path, "First", Vec::new()).unwrap();
        assert!(matches!(
            ctx.import_from_file(&path, "Second", Vec::new()),
            Err(CodexSwitchError::InvalidInput(_))
        ));
    }

    #[test]
    fn import_requires_unlocked_vault() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "xyz");
        ctx.lock_vault().unwrap();

        assert!(matches!(
            ctx.import_from_file(&path, "", Vec::new()),
            Err(CodexSwitchError::VaultLocked)
        ));
    }

    #[test]
    fn switch_writes_live_file_and_history() {
        let (dir, ctx) = open_unlocked_context();
        let path_a = write_auth_file(&dir, "a.json", "token-a");
        let path_b = write_auth_file(&dir, "b.json", "token-b");
        let a = ctx.import_from_file(&path_a, "A", Vec::new()).unwrap();
        let b = ctx.import_from_file(&path_b, "B", Vec::new()).unwrap();

        // First switch: no live file yet, so no snapshot.
        let first = ctx.switch_account(&a.id, false).unwrap();
        assert!(first.snapshot_path.is_none());
        assert_eq!(
            fs::read(ctx.auth_path()).unwrap(),
            fs::read(&path_a).unwrap()
        );

        // Second switch snapshots A's content before writing B's.
        let second = ctx.switch_account(&b.id, false).unwrap();
        let snapshot = second.snapshot_path.clone().unwrap();
        assert_eq!(
            fs::read(&snapshot).unwrap(),
            fs::read(&path_a).unwrap()
        );
        assert_eq!(
            fs::read(ctx.auth_path()).unwrap(),
            fs::read(&path_b).unwrap()
        );

        let history = ctx.list_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].result, SwitchOutcome::Success);
        assert_eq!(history[0].from_account_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(history[0].to_account_id.as_deref(), Some(b.id.as_str()));

        let accounts = ctx.list_accounts().unwrap();
        let used = accounts.iter().find(|acc| acc.id == b.id).unwrap();
        assert!(used.last_used_at.is_some());
    }

    #[test]
    fn switch_is_idempotent_on_the_live_file() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "token-a");
        let a = ctx.import_from_file(&path, "A", Vec::new()).unwrap();

        ctx.switch_account(&a.id, false).unwrap();
        let before = fs::read(ctx.auth_path()).unwrap();
        ctx.switch_account(&a.id, false).unwrap();
        assert_eq!(fs::read(ctx.auth_path()).unwrap(), before);
        assert_eq!(ctx.list_history(10).unwrap().len(), 2);
    }

    #[test]
    fn switch_requires_unlocked_vault_and_known_account() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "token-a");
        let a = ctx.import_from_file(&path, "A", Vec::new()).unwrap();

        assert!(matches!(
            ctx.switch_account("no-such-account", false),
            Err(CodexSwitchError::NotFound(_))
        ));

        ctx.lock_vault().unwrap();
        assert!(matches!(
            ctx.switch_account(&a.id, false),
            Err(CodexSwitchError::VaultLocked)
        ));
    }

    #[test]
    fn rollback_restores_previous_content() {
        let (dir, ctx) = open_unlocked_context();
        let path_a = write_auth_file(&dir, "a.json", "token-a");
        let path_b = write_auth_file(&dir, "b.json", "token-b");
        let a = ctx.import_from_file(&path_a, "A", Vec::new()).unwrap();
        let b = ctx.import_from_file(&path_b, "B", Vec::new()).unwrap();

        ctx.switch_account(&a.id, false).unwrap();
        let switch_b = ctx.switch_account(&b.id, false).unwrap();

        let report = ctx.rollback(&switch_b.history_id).unwrap();
        assert_eq!(
            fs::read(ctx.auth_path()).unwrap(),
            fs::read(&path_a).unwrap()
        );

        let rolled = ctx
            .list_history(1)
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(rolled.id, report.history_id);
        assert_eq!(rolled.result, SwitchOutcome::RolledBack);
        assert_eq!(rolled.from_account_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(rolled.to_account_id.as_deref(), Some(a.id.as_str()));

        // The referenced snapshot survives the rollback.
        assert!(PathBuf::from(switch_b.snapshot_path.unwrap()).exists());
    }

    #[test]
    fn rollback_without_snapshot_fails() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "token-a");
        let a = ctx.import_from_file(&path, "A", Vec::new()).unwrap();

        // First switch has no snapshot: the live file did not exist.
        let report = ctx.switch_account(&a.id, false).unwrap();
        assert!(matches!(
            ctx.rollback(&report.history_id),
            Err(CodexSwitchError::NoSnapshot)
        ));

        assert!(matches!(
            ctx.rollback("no-such-history"),
            Err(CodexSwitchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn refresh_quota_requires_unlocked_vault() {
        let (_dir, ctx) = open_context();
        ctx.init_vault(PASSWORD).unwrap();
        ctx.lock_vault().unwrap();
        assert!(matches!(
            ctx.refresh_quota(None, false).await,
            Err(CodexSwitchError::VaultLocked)
        ));
    }

    #[tokio::test]
    async fn refresh_quota_serves_fresh_snapshot_from_cache() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "token-a");
        let a = ctx.import_from_file(&path, "A", Vec::new()).unwrap();

        let seeded = {
            let db = ctx.db().unwrap();
            db.save_quota_snapshot(
                &a.id,
                &ProbeOutcome::unknown("seeded_for_test", "merged"),
            )
            .unwrap()
        };

        // Inside the TTL a non-forced refresh returns the identical row and
        // performs no probe.
        let first = ctx.refresh_quota(Some(a.id.as_str()), false).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, seeded.id);

        let again = ctx.refresh_quota(None, false).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, seeded.id);
    }

    #[tokio::test]
    async fn refresh_quota_unknown_account_is_not_found() {
        let (_dir, ctx) = open_unlocked_context();
        assert!(matches!(
            ctx.refresh_quota(Some("missing"), false).await,
            Err(CodexSwitchError::NotFound(_))
        ));
    }

    #[test]
    fn dashboard_pairs_accounts_with_latest_snapshots() {
        let (dir, ctx) = open_unlocked_context();
        let path_a = write_auth_file(&dir, "a.json", "token-a");
        let path_b = write_auth_file(&dir, "b.json", "token-b");
        let a = ctx.import_from_file(&path_a, "Alpha", Vec::new()).unwrap();
        let b = ctx.import_from_file(&path_b, "Beta", Vec::new()).unwrap();

        {
            let db = ctx.db().unwrap();
            db.save_quota_snapshot(&b.id, &ProbeOutcome::unknown("no_probe_yet", "merged"))
                .unwrap();
        }

        let dashboard = ctx.quota_dashboard().unwrap();
        assert_eq!(dashboard.len(), 2);
        // Accounts with no snapshot at all sort last.
        assert_eq!(dashboard[0].account.id, b.id);
        assert!(dashboard[0].snapshot.is_some());
        assert_eq!(dashboard[1].account.id, a.id);
        assert!(dashboard[1].snapshot.is_none());

        let snapshots = ctx.list_snapshots(&b.id, 10).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].mode, QuotaMode::Unknown);

        assert!(matches!(
            ctx.list_snapshots("missing", 10),
            Err(CodexSwitchError::NotFound(_))
        ));
    }

    #[test]
    fn refresh_policy_is_clamped_and_persisted() {
        let (_dir, ctx) = open_unlocked_context();
        let applied = ctx
            .set_refresh_policy(RefreshPolicy {
                timeout_ms: 50,
                cache_ttl_s: 999_999,
                max_concurrency: 64,
            })
            .unwrap();
        assert_eq!(applied.timeout_ms, 1_000);
        assert_eq!(applied.cache_ttl_s, 3_600);
        assert_eq!(applied.max_concurrency, 16);

        let stored = ctx.db().unwrap().get_settings().unwrap();
        assert_eq!(stored.refresh.timeout_ms, 1_000);
        assert_eq!(stored.refresh.cache_ttl_s, 3_600);
        assert_eq!(stored.refresh.max_concurrency, 16);
    }

    #[test]
    fn diagnostics_report_paths_and_schema() {
        let (_dir, ctx) = open_unlocked_context();
        let diagnostics = ctx.get_runtime_diagnostics().unwrap();
        assert!(!diagnostics.auth_file_exists);
        assert_eq!(
            diagnostics.schema_version,
            crate::database::CURRENT_SCHEMA_VERSION
        );
        assert!(diagnostics.db_path.ends_with("codex-switch.db"));

        let status = ctx.get_cli_status().unwrap();
        assert_eq!(status.running, status.process_count > 0);
        assert!(!status.checked_at.is_empty());
    }

    #[test]
    fn account_meta_updates_and_deletes() {
        let (dir, ctx) = open_unlocked_context();
        let path = write_auth_file(&dir, "a.json", "token-a");
        let a = ctx.import_from_file(&path, "A", vec!["x".to_string()]).unwrap();

        ctx.update_account_meta(&a.id, "Renamed", vec!["y".to_string(), "y".to_string()])
            .unwrap();
        let fetched = ctx.list_accounts().unwrap();
        assert_eq!(fetched[0].name, "Renamed");
        assert_eq!(fetched[0].tags, vec!["y".to_string()]);

        assert!(matches!(
            ctx.update_account_meta(&a.id, "   ", Vec::new()),
            Err(CodexSwitchError::InvalidInput(_))
        ));

        ctx.delete_account(&a.id).unwrap();
        assert!(ctx.list_accounts().unwrap().is_empty());
    }
}
