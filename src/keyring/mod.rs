//! OS keyring integration for unlock without the master password.
//!
//! Stores and retrieves the vault's derived encryption key (base64) in
//! the operating system's secure credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! The master password itself is never stored.  All operations fail
//! gracefully: if the keyring is unavailable the error is returned and
//! the caller falls back to a password prompt.

use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

use crate::crypto::keys::KEY_LEN;
use crate::crypto::EncryptionKey;
use crate::errors::{CredVaultError, Result};

/// Service name used in the OS keyring.
const SERVICE_NAME: &str = "credvault";

/// Build a keyring entry key from a vault directory path.
fn entry_key(vault_id: &str) -> String {
    format!("vault-key:{vault_id}")
}

fn entry(vault_id: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(SERVICE_NAME, &entry_key(vault_id))
        .map_err(|e| CredVaultError::KeyringError(format!("failed to create keyring entry: {e}")))
}

/// Store the encryption key in the OS keyring for a specific vault.
pub fn store_key(vault_id: &str, key: &EncryptionKey) -> Result<()> {
    let encoded = Zeroizing::new(STANDARD.encode(key.as_bytes()));
    entry(vault_id)?
        .set_password(&encoded)
        .map_err(|e| CredVaultError::KeyringError(format!("failed to store key in keyring: {e}")))
}

/// Retrieve the encryption key for a specific vault.
///
/// Returns `None` if no key is stored (rather than an error).
pub fn load_key(vault_id: &str) -> Result<Option<EncryptionKey>> {
    let encoded = match entry(vault_id)?.get_password() {
        Ok(value) => Zeroizing::new(value),
        Err(keyring::Error::NoEntry) => return Ok(None),
        Err(e) => {
            return Err(CredVaultError::KeyringError(format!(
                "failed to read from keyring: {e}"
            )))
        }
    };

    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| CredVaultError::KeyringError(format!("stored key is not base64: {e}")))?,
    );
    let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
        CredVaultError::KeyringError(format!("stored key is not {KEY_LEN} bytes"))
    })?;
    Ok(Some(EncryptionKey::from_bytes(key)))
}

/// Delete a stored key from the OS keyring.
pub fn delete_key(vault_id: &str) -> Result<()> {
    match entry(vault_id)?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()), // Already gone, that's fine.
        Err(e) => Err(CredVaultError::KeyringError(format!(
            "failed to delete from keyring: {e}"
        ))),
    }
}
