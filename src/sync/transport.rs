//! Interfaces to the outside world that the sync core depends on.
//!
//! The core never sees a filesystem path, an HTTP client or an OAuth
//! token: it talks to these traits and the host plugs in real
//! implementations (`sync::file` ships two simple ones).

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::crypto::EncryptionKey;
use crate::errors::{Result, TransportError};
use crate::vault::EncryptedBlob;

/// Local persistence of the encrypted vault.
#[async_trait]
pub trait SecureBlobStore: Send + Sync {
    async fn save(&self, blob: &EncryptedBlob) -> std::io::Result<()>;

    async fn load(&self) -> std::io::Result<EncryptedBlob>;
}

/// A remote (or removable) backup destination.
///
/// Session and token refresh are entirely the implementor's business.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn upload(&self, blob: &EncryptedBlob) -> std::result::Result<(), TransportError>;

    async fn download(&self) -> std::result::Result<EncryptedBlob, TransportError>;

    /// Whether the destination is connected and usable right now.
    fn is_authenticated(&self) -> bool;
}

/// Supplies what is needed to unlock the vault at session start.
pub trait CredentialPrompt {
    /// The account name, when the host asks for it.  `None` means "use
    /// the name stored with the vault credentials".
    fn username(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn master_password(&self) -> Result<Zeroizing<String>>;

    /// A platform-protected copy of the encryption key (keyring,
    /// biometric enclave), if one is available.
    fn stored_key(&self) -> Result<Option<EncryptionKey>> {
        Ok(None)
    }
}
