//! Cryptographic primitives for CredVault.
//!
//! This module provides:
//! - AES-256-GCM sealing and opening (`encryption`)
//! - Argon2id password-based key derivation (`kdf`)
//! - The HKDF key hierarchy, unlock and password change (`keys`)
//! - Password strength hints (`strength`)

pub mod encryption;
pub mod kdf;
pub mod keys;
pub mod strength;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{initialize, unlock, EncryptionKey, ...};
pub use kdf::{generate_salt, KdfParams};
pub use keys::{
    change_password, initialize, unlock, validate_new_password, EncryptionKey, VaultCredentials,
};
pub use strength::{estimate as estimate_strength, Strength, StrengthLabel};
