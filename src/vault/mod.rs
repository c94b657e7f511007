//! Vault module — records, the in-memory store, and the encrypted envelope.
//!
//! This module provides:
//! - `Folder`, `Item` and `VaultSnapshot` types (`model`)
//! - The authoritative in-memory `VaultStore` (`store`)
//! - Snapshot encryption and decryption (`codec`)

pub mod codec;
pub mod model;
pub mod store;

// Re-export the most commonly used items.
pub use codec::{decrypt_snapshot, encrypt_snapshot, EncryptedBlob, BLOB_FORMAT_VERSION};
pub use model::{
    CustomField, EntityKind, Folder, Item, ItemDraft, ItemKind, SecretValue, VaultSnapshot,
    DEFAULT_FOLDER_ID, DEFAULT_FOLDER_NAME, MAX_REVISION, SNAPSHOT_FORMAT_VERSION,
};
pub use store::VaultStore;
