//! `credvault passwd` — change the master password.
//!
//! Verifies the current password, derives a new salt, key and verifier
//! from the new one, re-encrypts the vault under the new key, and
//! swaps the vault and credentials files in as a pair.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{audit, prompt_new_password, prompt_password, Cli, Context, OpenVault};
use crate::crypto;
use crate::errors::Result;
use crate::sync::{replace_key_material, CredentialPrompt};
use crate::vault::encrypt_snapshot;

/// Unlocks with the password already typed, never the keyring.
struct TypedPassword {
    username: Option<String>,
    password: Zeroizing<String>,
}

impl CredentialPrompt for TypedPassword {
    fn username(&self) -> Result<Option<String>> {
        Ok(self.username.clone())
    }

    fn master_password(&self) -> Result<Zeroizing<String>> {
        Ok(self.password.clone())
    }
}

/// Execute the `passwd` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    // 1. Open the vault with the current password.
    output::info("Enter your current master password.");
    let current = TypedPassword {
        username: cli.username.clone(),
        password: prompt_password()?,
    };
    let mut vault = OpenVault::open_with(ctx, &current)?;

    // 2. Prompt for the new password.
    output::info("Choose your new master password.");
    let new_password = prompt_new_password("CREDVAULT_NEW_PASSWORD")?;

    // 3. Derive new credentials and switch the vault to the new key.
    let username = cli
        .username
        .clone()
        .unwrap_or_else(|| vault.credentials.username.clone());
    let (credentials, key) = crypto::change_password(
        &vault.credentials,
        &username,
        &current.password,
        &new_password,
    )?;
    vault.credentials = credentials;
    vault.key = key;

    // 4. Replace the vault and its credentials as one pair.
    let blob = encrypt_snapshot(&vault.store.export(), &vault.key)?;
    replace_key_material(vault.vault_dir(), &blob, &vault.credentials)?;

    // 5. Keep a keyring copy in step with the new key.
    #[cfg(feature = "keyring-store")]
    {
        let vault_id = vault.ctx.vault_id();
        if let Ok(Some(_)) = crate::keyring::load_key(&vault_id) {
            crate::keyring::store_key(&vault_id, &vault.key)?;
        }
    }

    audit(vault.vault_dir(), "passwd", None, Some("master password changed"));
    output::success("Master password changed.");
    output::warning("Backups made before this change still need the old password.");

    Ok(())
}
