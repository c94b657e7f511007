//! Integration tests for the backup/restore coordinator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use credvault::crypto::EncryptionKey;
use credvault::errors::{CodecError, CredVaultError, TransportError};
use credvault::merge::MergeMode;
use credvault::sync::{
    FileBlobStore, SyncConfig, SyncCoordinator, SyncKind, SyncOutcome, SyncSession, SyncState,
    TransportProvider, VaultSession,
};
use credvault::vault::{decrypt_snapshot, encrypt_snapshot, EncryptedBlob, VaultStore};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Fake transports
// ---------------------------------------------------------------------------

/// Keeps the last uploaded blob in memory.
#[derive(Clone, Default)]
struct MemoryTransport {
    slot: Arc<Mutex<Option<EncryptedBlob>>>,
    offline: bool,
}

#[async_trait]
impl TransportProvider for MemoryTransport {
    async fn upload(&self, blob: &EncryptedBlob) -> Result<(), TransportError> {
        *self.slot.lock().unwrap() = Some(blob.clone());
        Ok(())
    }

    async fn download(&self) -> Result<EncryptedBlob, TransportError> {
        self.slot.lock().unwrap().clone().ok_or(TransportError::NotFound)
    }

    fn is_authenticated(&self) -> bool {
        !self.offline
    }
}

/// Drops the first upload, then behaves like `MemoryTransport`.
#[derive(Clone, Default)]
struct FlakyTransport {
    inner: MemoryTransport,
    dropped_one: Arc<AtomicBool>,
}

#[async_trait]
impl TransportProvider for FlakyTransport {
    async fn upload(&self, blob: &EncryptedBlob) -> Result<(), TransportError> {
        if !self.dropped_one.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Network("connection reset".into()));
        }
        self.inner.upload(blob).await
    }

    async fn download(&self) -> Result<EncryptedBlob, TransportError> {
        self.inner.download().await
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Never answers.
struct HangingTransport;

#[async_trait]
impl TransportProvider for HangingTransport {
    async fn upload(&self, _blob: &EncryptedBlob) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn download(&self) -> Result<EncryptedBlob, TransportError> {
        std::future::pending().await
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Uploads block until the test opens the gate.
struct GatedTransport {
    gate: Arc<Notify>,
}

#[async_trait]
impl TransportProvider for GatedTransport {
    async fn upload(&self, _blob: &EncryptedBlob) -> Result<(), TransportError> {
        self.gate.notified().await;
        Ok(())
    }

    async fn download(&self) -> Result<EncryptedBlob, TransportError> {
        Err(TransportError::NotFound)
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key(byte: u8) -> EncryptionKey {
    EncryptionKey::from_bytes([byte; 32])
}

fn config() -> SyncConfig {
    SyncConfig {
        transport_timeout: Duration::from_secs(5),
        retry_base: Duration::from_secs(30),
        retry_max: Duration::from_secs(300),
    }
}

fn store_with_folder(name: &str) -> Arc<Mutex<VaultStore>> {
    let mut store = VaultStore::new();
    store.create_folder(name).unwrap();
    Arc::new(Mutex::new(store))
}

fn coordinator(
    store: Arc<Mutex<VaultStore>>,
    transport: impl TransportProvider + 'static,
    key: EncryptionKey,
) -> SyncCoordinator {
    let vault = Arc::new(Mutex::new(VaultSession::unlocked(key, None)));
    SyncCoordinator::new(store, SyncSession::new(Box::new(transport), vault), config())
}

async fn wait_for_state(coordinator: &SyncCoordinator, state: SyncState) {
    while coordinator.state().unwrap() != state {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Backup and restore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backup_then_restore_on_another_device() {
    let transport = MemoryTransport::default();

    let laptop = store_with_folder("Work");
    let sync = coordinator(laptop.clone(), transport.clone(), key(7));
    let outcome = sync.backup().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::BackedUp { bytes } if bytes > 0));
    assert_eq!(sync.state().unwrap(), SyncState::Idle);

    let phone = store_with_folder("Home");
    let sync = coordinator(phone.clone(), transport, key(7));
    let outcome = sync.restore(MergeMode::Merge).await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Restored {
            conflicts: vec![],
            persisted: false
        }
    );

    let phone = phone.lock().unwrap();
    assert!(phone.folder_by_name("Work").is_some());
    assert!(phone.folder_by_name("Home").is_some());
}

#[tokio::test]
async fn overwrite_restore_replaces_local_records() {
    let transport = MemoryTransport::default();
    coordinator(store_with_folder("Work"), transport.clone(), key(1))
        .backup()
        .await
        .unwrap();

    let local = store_with_folder("Home");
    let sync = coordinator(local.clone(), transport, key(1));
    sync.restore(MergeMode::Overwrite).await.unwrap();

    let local = local.lock().unwrap();
    assert!(local.folder_by_name("Work").is_some());
    assert!(local.folder_by_name("Home").is_none());
}

#[tokio::test]
async fn restore_persists_to_the_local_blob_store() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MemoryTransport::default();
    coordinator(store_with_folder("Work"), transport.clone(), key(4))
        .backup()
        .await
        .unwrap();

    let local = Arc::new(Mutex::new(VaultStore::new()));
    let vault = Arc::new(Mutex::new(VaultSession::unlocked(key(4), None)));
    let session = SyncSession::new(Box::new(transport), vault)
        .with_local_store(Box::new(FileBlobStore::in_dir(dir.path())));
    let sync = SyncCoordinator::new(local.clone(), session, config());

    let outcome = sync.restore(MergeMode::Merge).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Restored { persisted: true, .. }));

    let saved = FileBlobStore::in_dir(dir.path()).load_blocking().unwrap();
    let snapshot = decrypt_snapshot(&saved, &key(4)).unwrap();
    assert_eq!(snapshot, local.lock().unwrap().export());
}

#[tokio::test]
async fn import_merges_a_blob_without_the_transport() {
    let source = store_with_folder("Archive");
    let blob = encrypt_snapshot(&source.lock().unwrap().export(), &key(2)).unwrap();

    let local = store_with_folder("Work");
    let sync = coordinator(local.clone(), HangingTransport, key(2));
    sync.import(blob, MergeMode::Merge).await.unwrap();

    assert!(local.lock().unwrap().folder_by_name("Archive").is_some());
}

#[tokio::test]
async fn restore_with_wrong_key_leaves_store_untouched() {
    let transport = MemoryTransport::default();
    coordinator(store_with_folder("Work"), transport.clone(), key(1))
        .backup()
        .await
        .unwrap();

    let local = store_with_folder("Home");
    let before = local.lock().unwrap().export();
    let generation = local.lock().unwrap().generation();

    let sync = coordinator(local.clone(), transport, key(2));
    let err = sync.restore(MergeMode::Merge).await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Codec(CodecError::AuthenticationFailed)
    ));

    let local = local.lock().unwrap();
    assert_eq!(local.export(), before);
    assert_eq!(local.generation(), generation);

    let status = sync.status().unwrap();
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.last_error.is_some());
    assert!(status.retry_at.is_none());
}

#[tokio::test]
async fn restore_without_backup_reports_not_found() {
    let sync = coordinator(store_with_folder("Work"), MemoryTransport::default(), key(1));
    let err = sync.restore(MergeMode::Merge).await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Transport(TransportError::NotFound)
    ));
}

#[tokio::test]
async fn locked_session_refuses_backup() {
    let store = store_with_folder("Work");
    let vault = Arc::new(Mutex::new(VaultSession::unlocked(key(1), None)));
    let session = SyncSession::new(Box::new(MemoryTransport::default()), vault.clone());
    let sync = SyncCoordinator::new(store, session, config());

    vault.lock().unwrap().lock();
    let err = sync.backup().await.unwrap_err();
    assert!(matches!(err, CredVaultError::VaultLocked));
}

// ---------------------------------------------------------------------------
// Failures and retries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnected_transport_is_reported() {
    let transport = MemoryTransport {
        offline: true,
        ..Default::default()
    };
    let sync = coordinator(store_with_folder("Work"), transport.clone(), key(1));

    let err = sync.backup().await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Transport(TransportError::NotAuthenticated)
    ));
    assert!(transport.slot.lock().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn hung_transport_times_out_and_backs_off() {
    let sync = coordinator(store_with_folder("Work"), HangingTransport, key(1));

    let err = sync.backup().await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Transport(TransportError::Timeout(d)) if d == Duration::from_secs(5)
    ));

    let status = sync.status().unwrap();
    assert_eq!(status.state, SyncState::Idle);
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.is_some());
    assert!(status.retry_at.is_some());

    // Still inside the back-off window.
    assert_eq!(sync.tick().await.unwrap(), SyncOutcome::Idle);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(sync.tick().await.is_err());
    assert_eq!(sync.status().unwrap().consecutive_failures, 2);
}

#[tokio::test]
async fn successful_sync_clears_failure_state() {
    let sync = coordinator(store_with_folder("Work"), FlakyTransport::default(), key(1));

    let err = sync.backup().await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Transport(TransportError::Network(_))
    ));
    let status = sync.status().unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.retry_at.is_some());

    sync.backup().await.unwrap();
    let status = sync.status().unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.retry_at.is_none());
    assert!(status.last_error.is_none());
    assert!(status.last_success.is_some());
}

#[tokio::test(start_paused = true)]
async fn timed_out_restore_is_queued_for_the_next_tick() {
    let sync = coordinator(store_with_folder("Work"), HangingTransport, key(1));

    sync.restore(MergeMode::Merge).await.unwrap_err();
    let status = sync.status().unwrap();
    assert_eq!(status.pending, Some(SyncKind::Restore(MergeMode::Merge)));
    assert!(status.retry_at.is_some());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(matches!(
        sync.tick().await.unwrap_err(),
        CredVaultError::Transport(TransportError::Timeout(_))
    ));
    assert_eq!(sync.status().unwrap().consecutive_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn missing_backup_does_not_block_later_backups() {
    let transport = MemoryTransport::default();
    let store = store_with_folder("Work");
    let sync = coordinator(store.clone(), transport.clone(), key(1));

    let err = sync.restore(MergeMode::Merge).await.unwrap_err();
    assert!(matches!(
        err,
        CredVaultError::Transport(TransportError::NotFound)
    ));
    let status = sync.status().unwrap();
    assert_eq!(status.pending, None);
    assert!(status.retry_at.is_none());
    assert_eq!(status.consecutive_failures, 0);

    store.lock().unwrap().create_folder("Home").unwrap();
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(matches!(
        sync.tick().await.unwrap(),
        SyncOutcome::BackedUp { .. }
    ));
    assert!(transport.slot.lock().unwrap().is_some());
    assert_eq!(sync.tick().await.unwrap(), SyncOutcome::Idle);

    assert!(matches!(
        sync.restore(MergeMode::Merge).await.unwrap(),
        SyncOutcome::Restored { .. }
    ));
}

// ---------------------------------------------------------------------------
// Mutual exclusion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn triggers_during_a_sync_are_coalesced() {
    let gate = Arc::new(Notify::new());
    let sync = Arc::new(coordinator(
        store_with_folder("Work"),
        GatedTransport { gate: gate.clone() },
        key(1),
    ));

    let running = tokio::spawn({
        let sync = sync.clone();
        async move { sync.backup().await }
    });
    wait_for_state(&sync, SyncState::Transmitting).await;

    assert_eq!(sync.backup().await.unwrap(), SyncOutcome::Coalesced);
    assert_eq!(sync.backup().await.unwrap(), SyncOutcome::Coalesced);
    assert_eq!(sync.status().unwrap().pending, Some(SyncKind::Backup));
    assert_eq!(sync.tick().await.unwrap(), SyncOutcome::Idle);

    gate.notify_one();
    let first = running.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::BackedUp { .. }));

    // The queued request runs on the next tick.
    gate.notify_one();
    let queued = sync.tick().await.unwrap();
    assert!(matches!(queued, SyncOutcome::BackedUp { .. }));
    assert_eq!(sync.status().unwrap().pending, None);
}

#[tokio::test]
async fn queued_restore_supersedes_queued_backup() {
    let gate = Arc::new(Notify::new());
    let sync = Arc::new(coordinator(
        store_with_folder("Work"),
        GatedTransport { gate: gate.clone() },
        key(1),
    ));

    let running = tokio::spawn({
        let sync = sync.clone();
        async move { sync.backup().await }
    });
    wait_for_state(&sync, SyncState::Transmitting).await;

    sync.restore(MergeMode::Merge).await.unwrap();
    sync.backup().await.unwrap();
    assert_eq!(
        sync.status().unwrap().pending,
        Some(SyncKind::Restore(MergeMode::Merge))
    );

    gate.notify_one();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn import_is_refused_while_busy() {
    let gate = Arc::new(Notify::new());
    let sync = Arc::new(coordinator(
        store_with_folder("Work"),
        GatedTransport { gate: gate.clone() },
        key(1),
    ));

    let running = tokio::spawn({
        let sync = sync.clone();
        async move { sync.backup().await }
    });
    wait_for_state(&sync, SyncState::Transmitting).await;

    let blob = encrypt_snapshot(&VaultStore::new().export(), &key(1)).unwrap();
    let err = sync.import(blob, MergeMode::Merge).await.unwrap_err();
    assert!(matches!(err, CredVaultError::SyncInProgress));

    gate.notify_one();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancel_aborts_a_running_sync() {
    let gate = Arc::new(Notify::new());
    let sync = Arc::new(coordinator(
        store_with_folder("Work"),
        GatedTransport { gate },
        key(1),
    ));
    assert!(!sync.cancel().unwrap());

    let running = tokio::spawn({
        let sync = sync.clone();
        async move { sync.backup().await }
    });
    wait_for_state(&sync, SyncState::Transmitting).await;

    assert!(sync.cancel().unwrap());
    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, CredVaultError::SyncCancelled));

    let status = sync.status().unwrap();
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.retry_at.is_none());
}

#[tokio::test]
async fn compact_is_refused_while_a_sync_runs() {
    let gate = Arc::new(Notify::new());
    let store = store_with_folder("Work");
    let sync = Arc::new(coordinator(
        store.clone(),
        GatedTransport { gate: gate.clone() },
        key(1),
    ));

    let running = tokio::spawn({
        let sync = sync.clone();
        async move { sync.backup().await }
    });
    wait_for_state(&sync, SyncState::Transmitting).await;

    let err = sync.compact(chrono::Duration::days(30)).unwrap_err();
    assert!(matches!(err, CredVaultError::SyncInProgress));

    gate.notify_one();
    running.await.unwrap().unwrap();
    assert_eq!(sync.compact(chrono::Duration::days(30)).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Background tick
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_backs_up_only_after_changes() {
    let transport = MemoryTransport::default();
    let store = store_with_folder("Work");
    let sync = coordinator(store.clone(), transport.clone(), key(1));

    assert!(matches!(
        sync.tick().await.unwrap(),
        SyncOutcome::BackedUp { .. }
    ));
    assert_eq!(sync.tick().await.unwrap(), SyncOutcome::Idle);

    store.lock().unwrap().create_folder("Home").unwrap();
    assert!(matches!(
        sync.tick().await.unwrap(),
        SyncOutcome::BackedUp { .. }
    ));

    let uploaded = transport.slot.lock().unwrap().clone().unwrap();
    let snapshot = decrypt_snapshot(&uploaded, &key(1)).unwrap();
    assert_eq!(snapshot.folders.len(), 2);
}

#[tokio::test]
async fn tick_skips_backup_while_disconnected() {
    let transport = MemoryTransport {
        offline: true,
        ..Default::default()
    };
    let sync = coordinator(store_with_folder("Work"), transport, key(1));
    assert_eq!(sync.tick().await.unwrap(), SyncOutcome::Idle);
    assert_eq!(sync.status().unwrap().consecutive_failures, 0);
}
