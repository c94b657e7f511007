//! The vault key hierarchy.
//!
//! One Argon2id root key per (username, password, salt) is expanded
//! with HKDF-SHA256 into two independent values:
//! - the **encryption key**, held in memory only for the unlocked session;
//! - the **verifier**, persisted so a later unlock can check the password.
//!
//! The two use different HKDF `info` labels, so a leaked verifier gives
//! no way back to the encryption key.

use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::kdf::{derive_root_key, generate_salt, KdfParams};
use crate::errors::{AuthError, CredVaultError, Result};

/// Length of derived sub-keys (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum password length to prevent trivially weak passwords.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Current version of the persisted credentials record.
const CREDENTIALS_VERSION: u8 = 1;

const ENCRYPTION_KEY_INFO: &[u8] = b"credvault-encryption-key-v1";
const VERIFIER_INFO: &[u8] = b"credvault-verifier-v1";

/// The symmetric key that seals vault snapshots.
///
/// Zeroed when dropped; `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Wrap raw key bytes, e.g. when restoring a key from the OS keyring.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Everything that must be persisted to unlock the vault later.
///
/// Contains no key material: only the salt, the KDF cost and the
/// verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCredentials {
    pub version: u8,

    /// The account name chosen at setup; part of the KDF input.
    pub username: String,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    pub kdf: KdfParams,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub verifier: Vec<u8>,

    pub created_at: DateTime<Utc>,
}

/// Set up a new vault identity.
///
/// Returns the credentials record to persist and the encryption key
/// for the current session.
pub fn initialize(
    master_password: &str,
    username: &str,
    kdf: &KdfParams,
) -> Result<(VaultCredentials, EncryptionKey)> {
    validate_new_password(master_password)?;
    let username = username.trim();
    if username.is_empty() {
        return Err(CredVaultError::Validation("username cannot be empty".into()));
    }

    let salt = generate_salt();
    let (key, verifier) = derive_pair(username, master_password, &salt, kdf)?;

    let credentials = VaultCredentials {
        version: CREDENTIALS_VERSION,
        username: username.to_string(),
        salt: salt.to_vec(),
        kdf: *kdf,
        verifier: verifier.to_vec(),
        created_at: Utc::now(),
    };

    Ok((credentials, key))
}

/// Check a username + password against stored credentials.
///
/// Any mismatch yields `AuthError::InvalidCredentials`, whichever input
/// was wrong.
pub fn unlock(
    username: &str,
    master_password: &str,
    credentials: &VaultCredentials,
) -> Result<EncryptionKey> {
    if master_password.is_empty() {
        return Err(AuthError::InvalidCredentials.into());
    }

    let (key, verifier) = derive_pair(
        username.trim(),
        master_password,
        &credentials.salt,
        &credentials.kdf,
    )?;

    let matches: bool = verifier
        .as_slice()
        .ct_eq(credentials.verifier.as_slice())
        .into();
    if !matches {
        return Err(AuthError::InvalidCredentials.into());
    }

    Ok(key)
}

/// Replace the master password.
///
/// Verifies the current credentials first, then derives a fresh salt,
/// key and verifier.  The caller must re-encrypt the vault with the
/// returned key.
pub fn change_password(
    credentials: &VaultCredentials,
    username: &str,
    current_password: &str,
    new_password: &str,
) -> Result<(VaultCredentials, EncryptionKey)> {
    unlock(username, current_password, credentials)?;
    initialize(new_password, username, &credentials.kdf)
}

/// Reject empty or trivially short master passwords.
pub fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredVaultError::Validation(format!(
            "master password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn derive_pair(
    username: &str,
    password: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<(EncryptionKey, Zeroizing<[u8; KEY_LEN]>)> {
    // Length-prefix the username so ("ab", "c...") and ("a", "bc...") differ.
    let mut material = Zeroizing::new(Vec::with_capacity(4 + username.len() + password.len()));
    let username_len = u32::try_from(username.len())
        .map_err(|_| CredVaultError::Validation("username is too long".into()))?;
    material.extend_from_slice(&username_len.to_le_bytes());
    material.extend_from_slice(username.as_bytes());
    material.extend_from_slice(password.as_bytes());

    let root = derive_root_key(&material, salt, kdf)?;

    let key = EncryptionKey::from_bytes(*hkdf_derive(root.as_ref(), ENCRYPTION_KEY_INFO)?);
    let verifier = hkdf_derive(root.as_ref(), VERIFIER_INFO)?;
    Ok((key, verifier))
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The root key already has full entropy (it came from Argon2id), so
/// no extract salt is used.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, okm.as_mut())
        .map_err(|e| CredVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(password: &str) -> (VaultCredentials, EncryptionKey) {
        initialize(password, "alice", &KdfParams::minimum()).unwrap()
    }

    #[test]
    fn unlock_with_correct_password_returns_same_key() {
        let (creds, key) = setup("Tr0ub4dor!");
        let unlocked = unlock("alice", "Tr0ub4dor!", &creds).unwrap();
        assert_eq!(key.as_bytes(), unlocked.as_bytes());
    }

    #[test]
    fn unlock_with_wrong_password_is_invalid_credentials() {
        let (creds, _) = setup("Tr0ub4dor!");
        let err = unlock("alice", "Tr0ub4dor?", &creds).unwrap_err();
        assert!(matches!(err, CredVaultError::Auth(AuthError::InvalidCredentials)));
    }

    #[test]
    fn unlock_with_wrong_username_is_indistinguishable() {
        let (creds, _) = setup("Tr0ub4dor!");
        let wrong_user = unlock("bob", "Tr0ub4dor!", &creds).unwrap_err();
        let wrong_pass = unlock("alice", "nope-nope", &creds).unwrap_err();
        assert_eq!(wrong_user.to_string(), wrong_pass.to_string());
    }

    #[test]
    fn username_is_trimmed() {
        let (creds, key) = setup("Tr0ub4dor!");
        let unlocked = unlock("  alice ", "Tr0ub4dor!", &creds).unwrap();
        assert_eq!(key.as_bytes(), unlocked.as_bytes());
    }

    #[test]
    fn verifier_is_not_the_encryption_key() {
        let (creds, key) = setup("Tr0ub4dor!");
        assert_eq!(creds.verifier.len(), KEY_LEN);
        assert_ne!(creds.verifier.as_slice(), key.as_bytes().as_slice());
    }

    #[test]
    fn short_and_empty_passwords_rejected() {
        for pw in ["", "short", "1234567"] {
            let err = initialize(pw, "alice", &KdfParams::minimum()).unwrap_err();
            assert!(matches!(err, CredVaultError::Validation(_)), "{pw:?}");
        }
    }

    #[test]
    fn empty_username_rejected() {
        let err = initialize("long-enough-pw", "   ", &KdfParams::minimum()).unwrap_err();
        assert!(matches!(err, CredVaultError::Validation(_)));
    }

    #[test]
    fn each_initialize_uses_a_fresh_salt() {
        let (a, ka) = setup("Tr0ub4dor!");
        let (b, kb) = setup("Tr0ub4dor!");
        assert_ne!(a.salt, b.salt);
        assert_ne!(ka.as_bytes(), kb.as_bytes());
    }

    #[test]
    fn change_password_requires_current_password() {
        let (creds, _) = setup("Tr0ub4dor!");
        assert!(change_password(&creds, "alice", "wrong-one", "new-password-1").is_err());

        let (new_creds, new_key) =
            change_password(&creds, "alice", "Tr0ub4dor!", "new-password-1").unwrap();
        assert!(unlock("alice", "Tr0ub4dor!", &new_creds).is_err());
        let again = unlock("alice", "new-password-1", &new_creds).unwrap();
        assert_eq!(again.as_bytes(), new_key.as_bytes());
    }

    #[test]
    fn credentials_roundtrip_through_json() {
        let (creds, _) = setup("Tr0ub4dor!");
        let json = serde_json::to_string(&creds).unwrap();
        let back: VaultCredentials = serde_json::from_str(&json).unwrap();
        assert_eq!(creds, back);
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::from_bytes([0x41; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "EncryptionKey([REDACTED])");
    }
}
