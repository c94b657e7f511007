//! Sync module — backup/restore orchestration and its collaborators.
//!
//! This module provides:
//! - The collaborator traits the core depends on (`transport`)
//! - File and directory implementations of them (`file`)
//! - The unlocked-session key holder with auto-lock (`session`)
//! - The `SyncCoordinator` state machine (`coordinator`)

pub mod coordinator;
pub mod file;
pub mod session;
pub mod transport;

pub use coordinator::{
    SyncConfig, SyncCoordinator, SyncKind, SyncOutcome, SyncSession, SyncState, SyncStatus,
};
pub use file::{
    load_credentials, replace_key_material, save_credentials, DirectoryTransport, FileBlobStore,
};
pub use session::{AutoLock, VaultSession};
pub use transport::{CredentialPrompt, SecureBlobStore, TransportProvider};
