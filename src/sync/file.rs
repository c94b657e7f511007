//! Filesystem-backed collaborators: the local vault file, the
//! credentials file, and a directory used as a backup destination
//! (a mounted drive, a synced folder, a USB stick).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::transport::{SecureBlobStore, TransportProvider};
use crate::crypto::VaultCredentials;
use crate::errors::{CredVaultError, Result, TransportError};
use crate::vault::EncryptedBlob;

/// File name of the encrypted vault inside the vault directory.
pub const VAULT_FILE_NAME: &str = "vault.cvault";

/// File name of the KDF salt + verifier inside the vault directory.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// File name used inside a backup directory.
pub const BACKUP_FILE_NAME: &str = "credvault-backup.cvault";

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// owner-only permissions, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    std::fs::write(&tmp_path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// The local encrypted vault file.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<vault_dir>/vault.cvault`.
    pub fn in_dir(vault_dir: &Path) -> Self {
        Self::new(vault_dir.join(VAULT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Blocking save, for callers outside an async runtime.
    pub fn save_blocking(&self, blob: &EncryptedBlob) -> std::io::Result<()> {
        write_atomic(&self.path, blob.as_bytes())?;
        debug!(path = %self.path.display(), bytes = blob.len(), "vault file written");
        Ok(())
    }

    /// Blocking load, for callers outside an async runtime.
    pub fn load_blocking(&self) -> std::io::Result<EncryptedBlob> {
        Ok(EncryptedBlob::from_bytes(std::fs::read(&self.path)?))
    }
}

#[async_trait]
impl SecureBlobStore for FileBlobStore {
    async fn save(&self, blob: &EncryptedBlob) -> std::io::Result<()> {
        let store = self.clone();
        let blob = blob.clone();
        tokio::task::spawn_blocking(move || store.save_blocking(&blob))
            .await
            .map_err(std::io::Error::other)?
    }

    async fn load(&self) -> std::io::Result<EncryptedBlob> {
        Ok(EncryptedBlob::from_bytes(tokio::fs::read(&self.path).await?))
    }
}

/// Read `credentials.json` from the vault directory.
pub fn load_credentials(vault_dir: &Path) -> Result<VaultCredentials> {
    let path = vault_dir.join(CREDENTIALS_FILE_NAME);
    if !path.exists() {
        return Err(CredVaultError::VaultNotFound(vault_dir.to_path_buf()));
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| CredVaultError::SerializationError(format!("{}: {e}", path.display())))
}

/// Write `credentials.json` into the vault directory.
pub fn save_credentials(vault_dir: &Path, credentials: &VaultCredentials) -> Result<()> {
    let json = serde_json::to_vec_pretty(credentials)
        .map_err(|e| CredVaultError::SerializationError(format!("credentials: {e}")))?;
    write_atomic(&vault_dir.join(CREDENTIALS_FILE_NAME), &json)?;
    Ok(())
}

/// Swap in a re-keyed vault together with the credentials that open it.
///
/// Both files are staged next to their targets before anything is
/// replaced. The previous vault is kept as `vault.cvault.bak` until the
/// new credentials are in place, and is put back if that step fails, so
/// the directory always holds a vault/credentials pair that unlock together.
pub fn replace_key_material(
    vault_dir: &Path,
    blob: &EncryptedBlob,
    credentials: &VaultCredentials,
) -> Result<()> {
    let vault_path = vault_dir.join(VAULT_FILE_NAME);
    let creds_path = vault_dir.join(CREDENTIALS_FILE_NAME);
    let staged_vault = vault_dir.join(format!("{VAULT_FILE_NAME}.new"));
    let staged_creds = vault_dir.join(format!("{CREDENTIALS_FILE_NAME}.new"));
    let previous = vault_dir.join(format!("{VAULT_FILE_NAME}.bak"));

    let discard = |paths: &[&PathBuf]| {
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    };

    let json = serde_json::to_vec_pretty(credentials)
        .map_err(|e| CredVaultError::SerializationError(format!("credentials: {e}")))?;
    let staged = write_atomic(&staged_creds, &json)
        .and_then(|()| write_atomic(&staged_vault, blob.as_bytes()))
        .and_then(|()| std::fs::copy(&vault_path, &previous).map(|_| ()));
    if let Err(e) = staged {
        discard(&[&staged_creds, &staged_vault, &previous]);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(&staged_vault, &vault_path) {
        discard(&[&staged_creds, &staged_vault, &previous]);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(&staged_creds, &creds_path) {
        warn!(error = %e, "credentials not replaced, putting previous vault back");
        if let Err(restore) = std::fs::rename(&previous, &vault_path) {
            return Err(CredVaultError::CorruptVault(format!(
                "new credentials could not be written ({e}) and the previous vault \
                 could not be restored ({restore}); it is kept at {}",
                previous.display()
            )));
        }
        discard(&[&staged_creds]);
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_file(&previous) {
        warn!(path = %previous.display(), error = %e, "could not remove previous vault copy");
    }
    debug!(dir = %vault_dir.display(), "vault re-keyed");
    Ok(())
}

/// A directory acting as the backup destination.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    dir: PathBuf,
}

impl DirectoryTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE_NAME)
    }
}

#[async_trait]
impl TransportProvider for DirectoryTransport {
    async fn upload(&self, blob: &EncryptedBlob) -> std::result::Result<(), TransportError> {
        let path = self.backup_path();
        let bytes = blob.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?
            .map_err(|e| TransportError::Network(e.to_string()))?;
        debug!(dir = %self.dir.display(), "backup written");
        Ok(())
    }

    async fn download(&self) -> std::result::Result<EncryptedBlob, TransportError> {
        match tokio::fs::read(self.backup_path()).await {
            Ok(bytes) => Ok(EncryptedBlob::from_bytes(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransportError::NotFound),
            Err(e) => Err(TransportError::Network(e.to_string())),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.dir.is_dir()
    }
}
