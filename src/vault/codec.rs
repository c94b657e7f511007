//! Encrypted snapshot envelope.
//!
//! An encrypted vault blob has this layout:
//!
//! ```text
//! [version: 1 byte][nonce: 16 bytes][ciphertext + GCM tag: 16 bytes]
//! ```
//!
//! - **Version**: blob format version (currently `1`).
//! - **Nonce**: fresh random value for every `encrypt_snapshot` call.
//! - **Ciphertext**: AES-256-GCM over the canonical JSON of the
//!   snapshot.  The 17-byte header is the associated data, so changing
//!   the version byte or nonce breaks authentication as well.
//!
//! The KDF salt is not repeated here: it lives in the `VaultCredentials`
//! record stored next to the blob.

use tracing::debug;

use super::model::{VaultSnapshot, SNAPSHOT_FORMAT_VERSION};
use crate::crypto::encryption::{self, NONCE_LEN, TAG_LEN};
use crate::crypto::EncryptionKey;
use crate::errors::CodecError;

/// Current blob format version.
pub const BLOB_FORMAT_VERSION: u8 = 1;

/// Fixed-size prefix: 1 (version) + 16 (nonce).
const HEADER_LEN: usize = 1 + NONCE_LEN;

/// An encrypted, self-describing vault snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob(Vec<u8>);

impl EncryptedBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The format version byte, if present.
    pub fn version(&self) -> Option<u8> {
        self.0.first().copied()
    }
}

/// Serialize `snapshot` canonically and seal it under `key` with a
/// fresh random nonce.
pub fn encrypt_snapshot(
    snapshot: &VaultSnapshot,
    key: &EncryptionKey,
) -> Result<EncryptedBlob, CodecError> {
    encrypt_snapshot_with_nonce(snapshot, key, &encryption::generate_nonce())
}

/// Same as `encrypt_snapshot` with a caller-chosen nonce.
///
/// Identical snapshot + key + nonce give identical bytes.  Reusing a
/// nonce with the same key breaks GCM, so this stays crate-private.
pub(crate) fn encrypt_snapshot_with_nonce(
    snapshot: &VaultSnapshot,
    key: &EncryptionKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<EncryptedBlob, CodecError> {
    let plaintext = canonical_bytes(snapshot)?;

    let mut header = [0u8; HEADER_LEN];
    header[0] = BLOB_FORMAT_VERSION;
    header[1..].copy_from_slice(nonce);

    let ciphertext = encryption::seal(key.as_bytes(), nonce, &header, &plaintext)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&ciphertext);

    debug!(
        folders = snapshot.folders.len(),
        items = snapshot.items.len(),
        bytes = buf.len(),
        "snapshot encrypted"
    );
    Ok(EncryptedBlob(buf))
}

/// Verify and decrypt a blob produced by `encrypt_snapshot`.
///
/// The tag is checked before anything is parsed; on any failure no
/// snapshot is returned.
pub fn decrypt_snapshot(
    blob: &EncryptedBlob,
    key: &EncryptionKey,
) -> Result<VaultSnapshot, CodecError> {
    let data = blob.as_bytes();

    let version = *data
        .first()
        .ok_or_else(|| CodecError::Malformed("empty blob".into()))?;
    if version > BLOB_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version.into(),
            supported: BLOB_FORMAT_VERSION.into(),
        });
    }
    if version == 0 {
        return Err(CodecError::Malformed("format version 0 is invalid".into()));
    }
    if data.len() < HEADER_LEN + TAG_LEN {
        return Err(CodecError::Malformed("blob too small to be a vault".into()));
    }

    let (header, ciphertext) = data.split_at(HEADER_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&header[1..]);

    let plaintext = zeroize::Zeroizing::new(encryption::open(
        key.as_bytes(),
        &nonce,
        header,
        ciphertext,
    )?);

    let snapshot: VaultSnapshot = serde_json::from_slice(&plaintext)
        .map_err(|e| CodecError::Malformed(format!("snapshot JSON: {e}")))?;

    if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: snapshot.format_version,
            supported: SNAPSHOT_FORMAT_VERSION,
        });
    }

    debug!(
        folders = snapshot.folders.len(),
        items = snapshot.items.len(),
        "snapshot decrypted"
    );
    Ok(snapshot)
}

/// Canonical plaintext: snapshot re-sorted by id, fields in declaration
/// order.
fn canonical_bytes(snapshot: &VaultSnapshot) -> Result<zeroize::Zeroizing<Vec<u8>>, CodecError> {
    let mut canonical = snapshot.clone();
    canonical.folders.sort_by(|a, b| a.id.cmp(&b.id));
    canonical.items.sort_by(|a, b| a.id.cmp(&b.id));

    serde_json::to_vec(&canonical)
        .map(zeroize::Zeroizing::new)
        .map_err(|e| CodecError::EncryptionFailed(format!("snapshot serialization: {e}")))
}
