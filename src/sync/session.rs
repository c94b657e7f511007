//! Unlocked-session key lifecycle.
//!
//! The encryption key only exists in memory between unlock and lock.
//! Locking, explicitly or through the inactivity timeout, drops the
//! key, which zeroes it.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::transport::CredentialPrompt;
use crate::crypto::{self, EncryptionKey, VaultCredentials};
use crate::errors::{CredVaultError, Result};

/// Inactivity timer.  `None` timeout disables auto-lock.
#[derive(Debug, Clone)]
pub struct AutoLock {
    last_activity: Instant,
    timeout: Option<Duration>,
}

impl AutoLock {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            last_activity: Instant::now(),
            timeout,
        }
    }

    /// Update the last activity timestamp.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the inactivity window has elapsed.
    pub fn expired(&self) -> bool {
        self.timeout
            .is_some_and(|timeout| self.last_activity.elapsed() > timeout)
    }

    /// Time left before the vault locks itself.
    pub fn time_until_lock(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.last_activity.elapsed()))
    }
}

/// Holds the encryption key for one unlocked session.
pub struct VaultSession {
    key: Option<EncryptionKey>,
    auto_lock: AutoLock,
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("locked", &self.key.is_none())
            .field("auto_lock", &self.auto_lock)
            .finish()
    }
}

impl VaultSession {
    /// Start a session with an already-derived key.
    pub fn unlocked(key: EncryptionKey, auto_lock: Option<Duration>) -> Self {
        Self {
            key: Some(key),
            auto_lock: AutoLock::new(auto_lock),
        }
    }

    /// Unlock using whatever the prompt offers: a platform-stored key
    /// first, otherwise username + master password.
    pub fn unlock(
        prompt: &dyn CredentialPrompt,
        credentials: &VaultCredentials,
        auto_lock: Option<Duration>,
    ) -> Result<Self> {
        if let Some(key) = prompt.stored_key()? {
            debug!("vault unlocked with platform-stored key");
            return Ok(Self::unlocked(key, auto_lock));
        }

        let username = prompt
            .username()?
            .unwrap_or_else(|| credentials.username.clone());
        let password = prompt.master_password()?;
        let key = crypto::unlock(&username, &password, credentials)?;

        info!("vault unlocked");
        Ok(Self::unlocked(key, auto_lock))
    }

    /// A copy of the key for one operation.  Locks the session first if
    /// the inactivity timeout has passed.
    pub fn key(&mut self) -> Result<EncryptionKey> {
        if self.auto_lock.expired() {
            self.lock();
        }
        let key = self.key.clone().ok_or(CredVaultError::VaultLocked)?;
        self.auto_lock.record_activity();
        Ok(key)
    }

    /// Record user activity without using the key.
    pub fn touch(&mut self) {
        self.auto_lock.record_activity();
    }

    /// Drop (and zero) the key.
    pub fn lock(&mut self) {
        if self.key.take().is_some() {
            info!("vault locked");
        }
    }

    pub fn is_locked(&self) -> bool {
        self.key.is_none() || self.auto_lock.expired()
    }

    pub fn auto_lock(&self) -> &AutoLock {
        &self.auto_lock
    }
}
