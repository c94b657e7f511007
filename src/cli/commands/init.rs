//! `credvault init` — create a new, empty vault.

use std::fs;

use crate::cli::output;
use crate::cli::{audit, prompt_new_password, prompt_username, Cli, Context};
use crate::crypto;
use crate::errors::{CredVaultError, Result};
use crate::sync::file::CREDENTIALS_FILE_NAME;
use crate::sync::save_credentials;
use crate::vault::{encrypt_snapshot, VaultSnapshot};

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    // 1. Refuse to overwrite an existing vault.
    let blob_store = ctx.blob_store();
    if ctx.vault_dir.join(CREDENTIALS_FILE_NAME).exists() || blob_store.exists() {
        output::tip("Use `credvault folder add` / `credvault item add` to fill the existing vault.");
        return Err(CredVaultError::VaultAlreadyExists(ctx.vault_dir.clone()));
    }

    // 2. Validate the KDF settings before asking for anything.
    let kdf = ctx.settings.kdf_params()?;

    // 3. Account name and master password.
    let username = prompt_username(cli)?;
    let password = prompt_new_password("CREDVAULT_PASSWORD")?;

    // 4. Derive the key and write the credentials + an empty vault.
    let (credentials, key) = crypto::initialize(&password, &username, &kdf)?;

    if !ctx.vault_dir.exists() {
        fs::create_dir_all(&ctx.vault_dir)?;
        output::info(&format!(
            "Created vault directory: {}",
            ctx.vault_dir.display()
        ));
    }
    let blob = encrypt_snapshot(&VaultSnapshot::empty(), &key)?;
    blob_store.save_blocking(&blob)?;
    save_credentials(&ctx.vault_dir, &credentials)?;

    audit(&ctx.vault_dir, "init", Some(&username), Some("vault created"));

    output::success(&format!("Vault created at {}", ctx.vault_dir.display()));
    output::tip("Run `credvault folder add <NAME>` to create a folder.");
    output::tip("Run `credvault item add <NAME>` to store a credential.");

    Ok(())
}
