//! `credvault auth` — manage unlock methods.
//!
//! Subcommands:
//! - `credvault auth keyring`          — save the vault key to the OS keyring
//! - `credvault auth keyring --delete` — remove it again
//!
//! When the keyring feature is not compiled in, keyring commands return
//! a helpful error message.

use crate::cli::Cli;
use crate::errors::Result;

/// Execute `credvault auth keyring` — save or delete the key in the OS keyring.
pub fn execute_keyring(cli: &Cli, delete: bool) -> Result<()> {
    #[cfg(feature = "keyring-store")]
    {
        use crate::cli::output;
        use crate::cli::{audit, prompt_password, Context, OpenVault};
        use crate::sync::CredentialPrompt;
        use zeroize::Zeroizing;

        // Always verify with the password; never trust an existing entry.
        struct PasswordOnly(Option<String>);

        impl CredentialPrompt for PasswordOnly {
            fn username(&self) -> Result<Option<String>> {
                Ok(self.0.clone())
            }

            fn master_password(&self) -> Result<Zeroizing<String>> {
                prompt_password()
            }
        }

        let ctx = Context::load(cli)?;
        let vault_id = ctx.vault_id();

        if delete {
            crate::keyring::delete_key(&vault_id)?;
            audit(&ctx.vault_dir, "auth.keyring", None, Some("removed"));
            output::success("Vault key removed from OS keyring.");
        } else {
            let vault = OpenVault::open_with(ctx, &PasswordOnly(cli.username.clone()))?;
            crate::keyring::store_key(&vault_id, &vault.key)?;
            audit(vault.vault_dir(), "auth.keyring", None, Some("stored"));
            output::success("Vault key saved to OS keyring. Future commands unlock automatically.");
        }

        Ok(())
    }

    #[cfg(not(feature = "keyring-store"))]
    {
        let _ = (cli, delete);
        Err(crate::errors::CredVaultError::KeyringError(
            "keyring support not compiled — rebuild with `cargo build --features keyring-store`"
                .into(),
        ))
    }
}
