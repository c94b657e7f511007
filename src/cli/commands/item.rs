//! `credvault item` — add, edit, show, delete and list items.

use std::io::{self, IsTerminal, Read};

use console::style;
use dialoguer::Confirm;
use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{audit, Cli, ItemAction, OpenVault};
use crate::crypto;
use crate::errors::{CredVaultError, Result};
use crate::vault::{CustomField, ItemDraft, ItemKind, SecretValue};

/// Execute an `item` subcommand.
pub fn execute(cli: &Cli, action: &ItemAction) -> Result<()> {
    let mut vault = OpenVault::open(cli)?;

    match action {
        ItemAction::Add {
            name,
            folder,
            note,
            login,
            url,
            fields,
            content,
        } => {
            let folder_id = match folder {
                Some(f) => vault.resolve_folder(f)?.id,
                None => vault.store.default_folder()?,
            };
            let kind = if *note {
                if login.is_some() || url.is_some() || !fields.is_empty() {
                    return Err(CredVaultError::Validation(
                        "--login, --url and --field only apply to credentials".into(),
                    ));
                }
                ItemKind::Note {
                    content: match content {
                        Some(text) => Some(text.clone()),
                        None => read_text(&format!("Note text for {name}"))?,
                    },
                }
            } else {
                let secret = read_secret(&format!("Secret for {name} (empty for none)"))?;
                if let Some(secret) = &secret {
                    crate::cli::warn_if_weak(secret.expose());
                }
                ItemKind::Credential {
                    username: login.clone(),
                    secret,
                    url: url.clone(),
                    custom_fields: parse_fields(fields)?,
                }
            };

            let item = vault.store.add_item(ItemDraft {
                folder_id,
                name: name.clone(),
                kind,
            })?;
            vault.save()?;
            audit(vault.vault_dir(), "item.add", Some(&item.name), Some(item.kind.label()));
            output::success(&format!("Added {} '{}'", item.kind.label(), item.name));
        }

        ItemAction::Edit {
            item,
            name,
            folder,
            login,
            url,
            secret,
            content,
        } => {
            let mut edited = vault.resolve_item(item)?;
            if let Some(name) = name {
                edited.name = name.clone();
            }
            if let Some(folder) = folder {
                edited.folder_id = vault.resolve_folder(folder)?.id;
            }

            match &mut edited.kind {
                ItemKind::Credential {
                    username,
                    secret: stored,
                    url: stored_url,
                    ..
                } => {
                    if content.is_some() {
                        return Err(CredVaultError::Validation(
                            "--content only applies to notes".into(),
                        ));
                    }
                    if let Some(login) = login {
                        *username = Some(login.clone());
                    }
                    if let Some(url) = url {
                        *stored_url = Some(url.clone());
                    }
                    if *secret {
                        *stored = read_secret(&format!("New secret for {}", edited.name))?;
                    }
                }
                ItemKind::Note { content: text } => {
                    if login.is_some() || url.is_some() || *secret {
                        return Err(CredVaultError::Validation(
                            "--login, --url and --secret only apply to credentials".into(),
                        ));
                    }
                    if let Some(content) = content {
                        *text = Some(content.clone());
                    }
                }
            }

            let updated = vault.store.update_item(edited)?;
            vault.save()?;
            audit(vault.vault_dir(), "item.edit", Some(&updated.name), None);
            output::success(&format!(
                "Updated '{}' (revision {})",
                updated.name, updated.revision
            ));
        }

        ItemAction::Show { item, reveal } => {
            let item = vault.resolve_item(item)?;
            let folder = vault
                .store
                .folder(&item.folder_id)
                .map_or("-", |f| f.name.as_str());

            println!("{}", style(&item.name).bold());
            println!("  type:     {}", item.kind.label());
            println!("  folder:   {folder}");
            println!("  id:       {}", item.id);
            println!("  revision: {}", item.revision);
            println!("  updated:  {}", item.updated_at.format("%Y-%m-%d %H:%M:%S"));

            match &item.kind {
                ItemKind::Credential {
                    username,
                    secret,
                    url,
                    custom_fields,
                } => {
                    println!("  login:    {}", username.as_deref().unwrap_or("-"));
                    println!("  url:      {}", url.as_deref().unwrap_or("-"));
                    match secret {
                        Some(secret) if *reveal => {
                            println!("  secret:   {}", secret.expose());
                        }
                        Some(_) => println!("  secret:   ********"),
                        None => println!("  secret:   -"),
                    }
                    if let Some(secret) = secret {
                        let strength = crypto::estimate_strength(secret.expose());
                        println!("  strength: {}", strength.label);
                    }
                    for field in custom_fields {
                        println!("  {}: {}", field.label, field.value);
                    }
                    if !reveal && secret.is_some() {
                        output::tip("Pass --reveal to print the secret.");
                    }
                }
                ItemKind::Note { content } => {
                    println!();
                    println!("{}", content.as_deref().unwrap_or(""));
                }
            }
        }

        ItemAction::Delete { item, force } => {
            let target = vault.resolve_item(item)?;
            if !force {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete '{}'?", target.name))
                    .default(false)
                    .interact()
                    .map_err(|e| CredVaultError::CommandFailed(format!("confirm prompt: {e}")))?;
                if !confirmed {
                    output::info("Cancelled.");
                    return Ok(());
                }
            }

            vault.store.delete_item(&target.id)?;
            vault.save()?;
            audit(vault.vault_dir(), "item.delete", Some(&target.name), None);
            output::success(&format!("Deleted '{}'", target.name));
        }

        ItemAction::List { folder } => {
            let items = match folder {
                Some(f) => {
                    let folder = vault.resolve_folder(f)?;
                    vault.store.items_in_folder(&folder.id)
                }
                None => vault.store.items(),
            };
            output::print_items_table(&vault.store, &items);
        }
    }

    Ok(())
}

/// Parse `LABEL=VALUE` pairs.
fn parse_fields(raw: &[String]) -> Result<Vec<CustomField>> {
    raw.iter()
        .map(|pair| {
            let (label, value) = pair.split_once('=').ok_or_else(|| {
                CredVaultError::Validation(format!("field '{pair}' is not LABEL=VALUE"))
            })?;
            let label = label.trim();
            if label.is_empty() {
                return Err(CredVaultError::Validation(format!(
                    "field '{pair}' has an empty label"
                )));
            }
            Ok(CustomField {
                label: label.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Read a secret from piped stdin or a hidden prompt.  Empty means none.
fn read_secret(prompt: &str) -> Result<Option<SecretValue>> {
    let value = if io::stdin().is_terminal() {
        Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
                .map_err(|e| CredVaultError::CommandFailed(format!("input prompt: {e}")))?,
        )
    } else {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut *buf)?;
        Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string())
    };

    Ok((!value.is_empty()).then(|| SecretValue::new(value.as_str())))
}

/// Read free text from piped stdin or a single-line prompt.
fn read_text(prompt: &str) -> Result<Option<String>> {
    let text = if io::stdin().is_terminal() {
        dialoguer::Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| CredVaultError::CommandFailed(format!("input prompt: {e}")))?
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf.trim_end().to_string()
    };
    Ok((!text.is_empty()).then_some(text))
}
