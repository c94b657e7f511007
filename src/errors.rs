use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Authentication failures when unlocking a vault.
///
/// Deliberately carries no detail about which input was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Failures while sealing or opening an encrypted vault blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Decryption failed — wrong key or corrupted vault data")]
    AuthenticationFailed,

    #[error("Unsupported vault format version {found} (this build understands up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Malformed vault blob: {0}")]
    Malformed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Failures reported by a backup transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Backup destination is not connected")]
    NotAuthenticated,

    #[error("Backup transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backup transport failed: {0}")]
    Network(String),

    #[error("No backup found at the destination")]
    NotFound,
}

/// All errors that can occur in CredVault.
#[derive(Debug, Error)]
pub enum CredVaultError {
    // --- Input errors ---
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Item '{0}' not found")]
    ItemNotFound(String),

    // --- Crypto errors ---
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Vault is locked — unlock it with the master password first")]
    VaultLocked,

    // --- Sync errors ---
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Merged vault could not be committed: {0}")]
    MergeUnresolvable(String),

    #[error("Sync operation was cancelled")]
    SyncCancelled,

    #[error("A sync operation is in progress")]
    SyncInProgress,

    // --- Vault file errors ---
    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Local vault is corrupted and was left untouched: {0}")]
    CorruptVault(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Password mismatch — passwords do not match")]
    PasswordMismatch,

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CredVaultError {
    /// Whether the failed operation may succeed if simply tried again later.
    ///
    /// A missing backup stays missing until something uploads one.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if !matches!(e, TransportError::NotFound))
    }
}

/// Convenience type alias for CredVault results.
pub type Result<T> = std::result::Result<T, CredVaultError>;
