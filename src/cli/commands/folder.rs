//! `credvault folder` — add, rename, delete and list folders.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::{audit, Cli, FolderAction, OpenVault};
use crate::errors::{CredVaultError, Result};

/// Execute a `folder` subcommand.
pub fn execute(cli: &Cli, action: &FolderAction) -> Result<()> {
    let mut vault = OpenVault::open(cli)?;

    match action {
        FolderAction::Add { name } => {
            let folder = vault.store.create_folder(name)?;
            vault.save()?;
            audit(vault.vault_dir(), "folder.add", Some(&folder.name), None);
            output::success(&format!("Folder '{}' created", folder.name));
        }

        FolderAction::Rename { folder, new_name } => {
            let current = vault.resolve_folder(folder)?;
            vault.store.rename_folder(&current.id, new_name)?;
            vault.save()?;
            let details = format!("renamed from '{}'", current.name);
            audit(vault.vault_dir(), "folder.rename", Some(new_name), Some(&details));
            output::success(&format!("Folder '{}' renamed to '{new_name}'", current.name));
        }

        FolderAction::Delete {
            folder,
            cascade,
            force,
        } => {
            let target = vault.resolve_folder(folder)?;
            let count = vault.store.items_in_folder(&target.id).len();

            if !force {
                let prompt = if *cascade {
                    format!("Delete folder '{}' and its {count} item(s)?", target.name)
                } else {
                    format!("Delete folder '{}'? Its {count} item(s) move to Ungrouped.", target.name)
                };
                let confirmed = Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .map_err(|e| CredVaultError::CommandFailed(format!("confirm prompt: {e}")))?;
                if !confirmed {
                    output::info("Cancelled.");
                    return Ok(());
                }
            }

            vault.store.delete_folder(&target.id, *cascade)?;
            vault.save()?;
            let details = format!("cascade={cascade}, items={count}");
            audit(vault.vault_dir(), "folder.delete", Some(&target.name), Some(&details));
            output::success(&format!("Deleted folder '{}'", target.name));
        }

        FolderAction::List => {
            let folders = vault.store.folders();
            output::print_folders_table(&vault.store, &folders);
        }
    }

    Ok(())
}
