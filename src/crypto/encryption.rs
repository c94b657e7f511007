//! AES-256-GCM authenticated encryption with 128-bit nonces.
//!
//! Each call to `seal` generates a fresh random 16-byte nonce.  The
//! caller decides where the nonce lives; `vault::codec` puts it in the
//! blob header.  Associated data is authenticated but not encrypted.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;

use crate::errors::CodecError;

/// AES-256-GCM parameterised with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Size of the nonce in bytes.
pub const NONCE_LEN: usize = 16;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Generate a random nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let nonce = Aes256Gcm16::generate_nonce(&mut OsRng);
    let mut out = [0u8; NONCE_LEN];
    out.copy_from_slice(&nonce);
    out
}

/// Encrypt `plaintext` under `key` and `nonce`, authenticating `aad`.
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn seal(
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let cipher = Aes256Gcm16::new_from_slice(key)
        .map_err(|e| CodecError::EncryptionFailed(format!("invalid key length: {e}")))?;

    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CodecError::EncryptionFailed(format!("encryption error: {e}")))
}

/// Decrypt data produced by `seal`.
///
/// Any tag mismatch (wrong key, wrong nonce, altered `aad` or
/// ciphertext) is `CodecError::AuthenticationFailed`.
pub fn open(
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let cipher =
        Aes256Gcm16::new_from_slice(key).map_err(|_| CodecError::AuthenticationFailed)?;

    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CodecError::AuthenticationFailed)
}
