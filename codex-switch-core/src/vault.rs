//! Vault session management.
//!
//! The vault moves `Uninitialized → Locked ⇄ Unlocked`. While unlocked, one
//! derived key lives in memory behind a lock so that concurrent
//! init/unlock/lock/wrap/unwrap calls observe a consistent state; locking
//! zeroizes the key. Wrong-password attempts are throttled with a sliding
//! one-minute window.

use crate::crypto::{self, CryptoError, KdfParams, VaultKey, AAD_AUTH, AAD_VERIFIER};
use crate::database::{Database, VaultMeta};
use crate::{CodexSwitchError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use zeroize::Zeroize;

/// Minimum master password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Failed unlock attempts tolerated per window before throttling.
pub const MAX_FAILED_ATTEMPTS: usize = 5;

/// Sliding window for the unlock throttle.
const ATTEMPT_WINDOW: Duration = Duration::from_secs(60);

/// Known plaintext whose decryption proves the derived key is right.
const VERIFIER_PLAINTEXT: &[u8] = b"codex-switch vault verifier v1";

/// Vault lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    Uninitialized,
    Locked,
    Unlocked,
}

/// Facade status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultStatus {
    pub state: VaultState,
    pub failed_attempts_in_window: usize,
}

struct VaultSession {
    key: Option<VaultKey>,
    failed_attempts: VecDeque<Instant>,
}

impl VaultSession {
    fn prune_window(&mut self) {
        while let Some(oldest) = self.failed_attempts.front() {
            if oldest.elapsed() > ATTEMPT_WINDOW {
                self.failed_attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn throttle_check(&mut self) -> Result<()> {
        self.prune_window();
        if self.failed_attempts.len() >= MAX_FAILED_ATTEMPTS {
            let oldest_elapsed = self
                .failed_attempts
                .front()
                .map(Instant::elapsed)
                .unwrap_or_default();
            let retry_after = ATTEMPT_WINDOW.saturating_sub(oldest_elapsed);
            return Err(CodexSwitchError::Throttled {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }
        Ok(())
    }
}

/// Vault manager: owns the in-memory key and guards every use of it.
pub struct VaultManager {
    db: Arc<Mutex<Database>>,
    session: Mutex<VaultSession>,
}

impl VaultManager {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            session: Mutex::new(VaultSession {
                key: None,
                failed_attempts: VecDeque::new(),
            }),
        }
    }

    fn session(&self) -> Result<MutexGuard<'_, VaultSession>> {
        self.session
            .lock()
            .map_err(|_| CodexSwitchError::Store("vault session lock poisoned".to_string()))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| CodexSwitchError::Store("database lock poisoned".to_string()))
    }

    fn load_meta(&self) -> Result<Option<VaultMeta>> {
        self.db()?.get_vault_meta()
    }

    /// Initialize a fresh vault and leave it unlocked.
    pub fn init(&self, password: &str, kdf_params: &KdfParams) -> Result<()> {
        let mut session = self.session()?;
        if self.load_meta()?.is_some() {
            return Err(CodexSwitchError::InvalidInput(
                "vault is already initialized".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CodexSwitchError::InvalidInput(format!(
                "master password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let salt = crypto::generate_salt();
        let key = crypto::derive_key(password.as_bytes(), &salt, kdf_params)?;
        let verifier_ciphertext = crypto::seal(&key, AAD_VERIFIER, VERIFIER_PLAINTEXT)?;

        self.db()?.set_vault_meta(&VaultMeta {
            kdf_salt: salt.to_vec(),
            kdf_params: kdf_params.clone(),
            verifier_ciphertext,
            created_at: Utc::now().to_rfc3339(),
        })?;

        session.key = Some(key);
        session.failed_attempts.clear();
        tracing::info!("vault initialized and unlocked");
        Ok(())
    }

    /// Unlock with the master password. Verifier decryption is the password
    /// check; failures count toward the throttle window.
    pub fn unlock(&self, password: &str) -> Result<()> {
        let mut session = self.session()?;
        let meta = self
            .load_meta()?
            .ok_or_else(|| CodexSwitchError::NotFound("vault is not initialized".to_string()))?;
        if session.key.is_some() {
            return Err(CodexSwitchError::InvalidInput(
                "vault is already unlocked".to_string(),
            ));
        }

        session.throttle_check()?;

        let salt: [u8; crypto::kdf::SALT_LEN] = meta
            .kdf_salt
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KdfFailed("stored salt has wrong length".to_string()))
            .map_err(CodexSwitchError::Crypto)?;
        let key = crypto::derive_key(password.as_bytes(), &salt, &meta.kdf_params)?;

        match crypto::open(&key, AAD_VERIFIER, &meta.verifier_ciphertext) {
            Ok(_) => {
                session.key = Some(key);
                session.failed_attempts.clear();
                tracing::info!("vault unlocked");
                Ok(())
            }
            Err(CryptoError::DecryptionFailed) => {
                session.failed_attempts.push_back(Instant::now());
                tracing::warn!(
                    failed_attempts = session.failed_attempts.len(),
                    "vault unlock rejected"
                );
                Err(CodexSwitchError::BadPassword)
            }
            Err(error) => Err(CodexSwitchError::Crypto(error)),
        }
    }

    /// Zeroize the key and return to `Locked`.
    pub fn lock(&self) -> Result<()> {
        let mut session = self.session()?;
        if self.load_meta()?.is_none() {
            return Err(CodexSwitchError::NotFound(
                "vault is not initialized".to_string(),
            ));
        }
        if let Some(mut key) = session.key.take() {
            key.zeroize();
        }
        tracing::info!("vault locked");
        Ok(())
    }

    /// Encrypt a credential blob under the session key.
    pub fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let session = self.session()?;
        let key = session.key.as_ref().ok_or(CodexSwitchError::VaultLocked)?;
        Ok(crypto::seal(key, AAD_AUTH, plaintext)?)
    }

    /// Decrypt a credential blob under the session key.
    pub fn unwrap_blob(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let session = self.session()?;
        let key = session.key.as_ref().ok_or(CodexSwitchError::VaultLocked)?;
        Ok(crypto::open(key, AAD_AUTH, ciphertext)?)
    }

    pub fn state(&self) -> Result<VaultState> {
        let session = self.session()?;
        if self.load_meta()?.is_none() {
            return Ok(VaultState::Uninitialized);
        }
        Ok(if session.key.is_some() {
            VaultState::Unlocked
        } else {
            VaultState::Locked
        })
    }

    pub fn status(&self) -> Result<VaultStatus> {
        let state = self.state()?;
        let mut session = self.session()?;
        session.prune_window();
        Ok(VaultStatus {
            state,
            failed_attempts_in_window: session.failed_attempts.len(),
        })
    }
}
