//! Backup and restore orchestration.
//!
//! A `SyncCoordinator` owns a handle to the vault store and drives one
//! sync at a time through a small state machine:
//!
//! ```text
//! backup:  Idle → Exporting → Encrypting → Transmitting → Idle
//! restore: Idle → Receiving → Decrypting → Merging → Committing → Idle
//! ```
//!
//! Triggers that arrive while a sync is running are coalesced into a
//! single pending request, which the next `tick()` runs.  Retryable
//! transport failures schedule a retry with exponential back-off.  A failure at
//! any step before `Committing` leaves the store untouched.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::VaultSession;
use super::transport::{SecureBlobStore, TransportProvider};
use crate::crypto::EncryptionKey;
use crate::errors::{CredVaultError, Result, TransportError};
use crate::merge::{self, ConflictRecord, MergeMode};
use crate::vault::{decrypt_snapshot, encrypt_snapshot, EncryptedBlob, VaultStore};

/// Where a running sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Exporting,
    Encrypting,
    Transmitting,
    Receiving,
    Decrypting,
    Merging,
    Committing,
}

/// A unit of sync work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Backup,
    Restore(MergeMode),
}

/// What a sync call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The encrypted snapshot was handed to the transport.
    BackedUp { bytes: usize },
    /// A remote snapshot was merged into the store.  `persisted` is false
    /// when the local vault file could not be rewritten afterwards.
    Restored {
        conflicts: Vec<ConflictRecord>,
        persisted: bool,
    },
    /// Another sync was running; this request was queued behind it.
    Coalesced,
    /// Nothing to do.
    Idle,
}

/// Tunables for the coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on a single upload or download.
    pub transport_timeout: Duration,
    /// First retry delay after a transport failure.
    pub retry_base: Duration,
    /// Cap on the retry delay.
    pub retry_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transport_timeout: Duration::from_secs(30),
            retry_base: Duration::from_secs(30),
            retry_max: Duration::from_secs(900),
        }
    }
}

impl SyncConfig {
    /// Back-off delay after `failures` consecutive transport failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.retry_base
            .saturating_mul(1u32 << exp)
            .min(self.retry_max)
    }
}

/// Snapshot of the coordinator for display.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub state: SyncState,
    pub pending: Option<SyncKind>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub retry_at: Option<Instant>,
    pub last_success: Option<DateTime<Utc>>,
}

/// The collaborators one sync session talks to.
pub struct SyncSession {
    transport: Box<dyn TransportProvider>,
    local_store: Option<Box<dyn SecureBlobStore>>,
    vault: Arc<Mutex<VaultSession>>,
}

impl SyncSession {
    pub fn new(transport: Box<dyn TransportProvider>, vault: Arc<Mutex<VaultSession>>) -> Self {
        Self {
            transport,
            local_store: None,
            vault,
        }
    }

    /// Persist the vault locally after every successful restore.
    pub fn with_local_store(mut self, store: Box<dyn SecureBlobStore>) -> Self {
        self.local_store = Some(store);
        self
    }

    pub fn vault(&self) -> &Arc<Mutex<VaultSession>> {
        &self.vault
    }

    fn key(&self) -> Result<EncryptionKey> {
        self.vault
            .lock()
            .map_err(|e| CredVaultError::LockPoisoned(e.to_string()))?
            .key()
    }
}

struct Inner {
    state: SyncState,
    pending: Option<SyncKind>,
    cancel: Option<CancellationToken>,
    last_error: Option<String>,
    consecutive_failures: u32,
    retry_at: Option<Instant>,
    last_success: Option<DateTime<Utc>>,
    backed_up_generation: Option<u64>,
}

/// Drives backups and restores against one store.
///
/// Lock order is store before coordinator state; neither lock is held
/// across an await point.
pub struct SyncCoordinator {
    store: Arc<Mutex<VaultStore>>,
    session: SyncSession,
    config: SyncConfig,
    inner: Mutex<Inner>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<Mutex<VaultStore>>, session: SyncSession, config: SyncConfig) -> Self {
        Self {
            store,
            session,
            config,
            inner: Mutex::new(Inner {
                state: SyncState::Idle,
                pending: None,
                cancel: None,
                last_error: None,
                consecutive_failures: 0,
                retry_at: None,
                last_success: None,
                backed_up_generation: None,
            }),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<VaultStore>> {
        &self.store
    }

    pub fn status(&self) -> Result<SyncStatus> {
        let inner = self.lock_inner()?;
        Ok(SyncStatus {
            state: inner.state,
            pending: inner.pending,
            last_error: inner.last_error.clone(),
            consecutive_failures: inner.consecutive_failures,
            retry_at: inner.retry_at,
            last_success: inner.last_success,
        })
    }

    pub fn state(&self) -> Result<SyncState> {
        Ok(self.lock_inner()?.state)
    }

    /// Encrypt the current store and upload it.
    pub async fn backup(&self) -> Result<SyncOutcome> {
        self.run(SyncKind::Backup).await
    }

    /// Download the remote snapshot and merge it into the store.
    pub async fn restore(&self, mode: MergeMode) -> Result<SyncOutcome> {
        self.run(SyncKind::Restore(mode)).await
    }

    /// Merge an already-obtained blob (e.g. a backup file picked by the
    /// user) into the store.  Skips the transport entirely, and is
    /// refused rather than queued while another sync runs.
    pub async fn import(&self, blob: EncryptedBlob, mode: MergeMode) -> Result<SyncOutcome> {
        let Some(cancel) = self.begin(SyncKind::Restore(mode), false)? else {
            return Err(CredVaultError::SyncInProgress);
        };
        let result = self.apply_remote(blob, mode, &cancel).await;
        self.finish(SyncKind::Restore(mode), &result)?;
        result
    }

    /// Periodic driver.  Runs a queued request, a due retry, or a backup
    /// when the store changed since the last successful one.
    pub async fn tick(&self) -> Result<SyncOutcome> {
        let next = {
            let generation = self.lock_store()?.generation();
            let mut inner = self.lock_inner()?;
            if inner.state != SyncState::Idle {
                return Ok(SyncOutcome::Idle);
            }
            if inner.retry_at.is_some_and(|at| Instant::now() < at) {
                return Ok(SyncOutcome::Idle);
            }
            if let Some(kind) = inner.pending.take() {
                Some(kind)
            } else if inner.retry_at.is_some() {
                Some(SyncKind::Backup)
            } else if inner.backed_up_generation != Some(generation)
                && self.session.transport.is_authenticated()
            {
                Some(SyncKind::Backup)
            } else {
                None
            }
        };

        match next {
            Some(kind) => self.run(kind).await,
            None => Ok(SyncOutcome::Idle),
        }
    }

    /// Abort the running sync, if any.  A commit already in progress is
    /// allowed to finish.
    pub fn cancel(&self) -> Result<bool> {
        let inner = self.lock_inner()?;
        match &inner.cancel {
            Some(token) => {
                info!(state = ?inner.state, "sync cancellation requested");
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Purge old tombstones.  Refused while a sync is running or queued.
    pub fn compact(&self, retention: chrono::Duration) -> Result<usize> {
        let mut store = self.lock_store()?;
        let inner = self.lock_inner()?;
        if inner.state != SyncState::Idle || inner.pending.is_some() {
            return Err(CredVaultError::SyncInProgress);
        }
        Ok(store.compact(retention, Utc::now()))
    }

    async fn run(&self, kind: SyncKind) -> Result<SyncOutcome> {
        let Some(cancel) = self.begin(kind, true)? else {
            return Ok(SyncOutcome::Coalesced);
        };
        let result = match kind {
            SyncKind::Backup => self.run_backup(&cancel).await,
            SyncKind::Restore(mode) => self.run_restore(mode, &cancel).await,
        };
        self.finish(kind, &result)?;
        result
    }

    /// Claim the coordinator for `kind`.  When busy, the request is
    /// queued if `coalesce` is set and dropped otherwise.
    fn begin(&self, kind: SyncKind, coalesce: bool) -> Result<Option<CancellationToken>> {
        let mut inner = self.lock_inner()?;
        if inner.state != SyncState::Idle {
            if !coalesce {
                return Ok(None);
            }
            inner.pending = Some(match (inner.pending, kind) {
                (Some(queued @ SyncKind::Restore(_)), SyncKind::Backup) => queued,
                _ => kind,
            });
            debug!(?kind, running = ?inner.state, "sync busy; request coalesced");
            return Ok(None);
        }

        if inner.pending == Some(kind) {
            inner.pending = None;
        }
        inner.state = match kind {
            SyncKind::Backup => SyncState::Exporting,
            SyncKind::Restore(_) => SyncState::Receiving,
        };
        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        debug!(?kind, "sync started");
        Ok(Some(token))
    }

    fn finish(&self, kind: SyncKind, result: &Result<SyncOutcome>) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.state = SyncState::Idle;
        inner.cancel = None;

        match result {
            Ok(_) => {
                inner.last_error = None;
                inner.consecutive_failures = 0;
                inner.retry_at = None;
                inner.last_success = Some(Utc::now());
                info!(?kind, "sync finished");
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                if e.is_retryable() {
                    inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                    let delay = self.config.backoff(inner.consecutive_failures);
                    inner.retry_at = Some(Instant::now() + delay);
                    if let SyncKind::Restore(_) = kind {
                        inner.pending.get_or_insert(kind);
                    }
                    warn!(?kind, error = %e, retry_in = ?delay, "sync failed; retry scheduled");
                } else {
                    inner.retry_at = None;
                    warn!(?kind, error = %e, "sync failed");
                }
            }
        }
        Ok(())
    }

    async fn run_backup(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let (snapshot, generation) = {
            let store = self.lock_store()?;
            (store.export(), store.generation())
        };
        check_cancelled(cancel)?;

        self.set_state(SyncState::Encrypting)?;
        let key = self.session.key()?;
        let blob = encrypt_snapshot(&snapshot, &key)?;
        drop(key);
        check_cancelled(cancel)?;

        self.set_state(SyncState::Transmitting)?;
        self.ensure_authenticated()?;
        self.transmit(cancel, self.session.transport.upload(&blob))
            .await?;

        self.lock_inner()?.backed_up_generation = Some(generation);
        info!(bytes = blob.len(), generation, "backup uploaded");
        Ok(SyncOutcome::BackedUp { bytes: blob.len() })
    }

    async fn run_restore(&self, mode: MergeMode, cancel: &CancellationToken) -> Result<SyncOutcome> {
        self.ensure_authenticated()?;
        let blob = self
            .transmit(cancel, self.session.transport.download())
            .await?;
        debug!(bytes = blob.len(), "backup downloaded");
        self.apply_remote(blob, mode, cancel).await
    }

    async fn apply_remote(
        &self,
        blob: EncryptedBlob,
        mode: MergeMode,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        self.set_state(SyncState::Decrypting)?;
        let key = self.session.key()?;
        let remote = decrypt_snapshot(&blob, &key)?;
        check_cancelled(cancel)?;

        let (conflicts, committed) = {
            let mut store = self.lock_store()?;
            self.set_state(SyncState::Merging)?;
            let outcome = merge::merge(&store.export(), &remote, mode);
            check_cancelled(cancel)?;

            self.set_state(SyncState::Committing)?;
            store
                .commit(outcome.merged)
                .map_err(|e| CredVaultError::MergeUnresolvable(e.to_string()))?;
            info!(
                conflicts = outcome.conflicts.len(),
                generation = store.generation(),
                "remote snapshot committed"
            );

            let committed = self.session.local_store.as_ref().map(|_| store.export());
            (outcome.conflicts, committed)
        };

        let persisted = match (&self.session.local_store, committed) {
            (Some(local), Some(snapshot)) => match encrypt_snapshot(&snapshot, &key) {
                Ok(blob) => match local.save(&blob).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "restored vault could not be saved locally");
                        false
                    }
                },
                Err(e) => {
                    warn!(error = %e, "restored vault could not be encrypted for local save");
                    false
                }
            },
            _ => false,
        };

        Ok(SyncOutcome::Restored {
            conflicts,
            persisted,
        })
    }

    async fn transmit<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        let limit = self.config.transport_timeout;
        tokio::select! {
            _ = cancel.cancelled() => Err(CredVaultError::SyncCancelled),
            res = tokio::time::timeout(limit, fut) => match res {
                Ok(inner) => inner.map_err(CredVaultError::from),
                Err(_) => Err(TransportError::Timeout(limit).into()),
            },
        }
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.transport.is_authenticated() {
            Ok(())
        } else {
            Err(TransportError::NotAuthenticated.into())
        }
    }

    fn set_state(&self, state: SyncState) -> Result<()> {
        self.lock_inner()?.state = state;
        debug!(?state, "sync state");
        Ok(())
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, VaultStore>> {
        self.store.lock().map_err(|e| CredVaultError::LockPoisoned(e.to_string()))
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| CredVaultError::LockPoisoned(e.to_string()))
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(CredVaultError::SyncCancelled)
    } else {
        Ok(())
    }
}
