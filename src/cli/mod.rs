//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::{self, EncryptionKey, StrengthLabel, VaultCredentials};
use crate::errors::{CodecError, CredVaultError, Result};
use crate::sync::{load_credentials, CredentialPrompt, FileBlobStore, VaultSession};
use crate::vault::{decrypt_snapshot, encrypt_snapshot, Folder, Item, VaultStore};

/// CredVault CLI: local-first encrypted credential vault.
#[derive(Parser)]
#[command(
    name = "credvault",
    about = "Local-first encrypted credential vault with conflict-aware backups",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: `vault_dir` from .credvault.toml, else .credvault)
    #[arg(long, global = true)]
    pub vault_dir: Option<String>,

    /// Account name used to unlock the vault (default: the one stored at init)
    #[arg(long, env = "CREDVAULT_USERNAME", global = true)]
    pub username: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new, empty vault
    Init,

    /// Manage folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },

    /// Manage credentials and secure notes
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },

    /// Search items by name, username or URL
    Search {
        /// Case-insensitive substring
        query: String,
    },

    /// Encrypt the vault and copy it to the backup directory
    Backup {
        /// Backup directory (default: `backup_dir` from .credvault.toml)
        #[arg(long)]
        to: Option<String>,
    },

    /// Merge (or overwrite with) a backup
    Restore {
        /// merge (default) or overwrite
        #[arg(long, default_value = "merge")]
        mode: String,

        /// Restore from this backup file instead of the backup directory
        #[arg(long)]
        from: Option<String>,

        /// Backup directory (default: `backup_dir` from .credvault.toml)
        #[arg(long, conflicts_with = "from")]
        dir: Option<String>,
    },

    /// Purge old deletion markers
    Compact {
        /// Keep markers younger than this many days (default: from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Change the master password
    Passwd,

    /// Manage unlock methods (OS keyring)
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// View the audit log of vault operations
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },
}

/// Folder subcommands.
#[derive(clap::Subcommand)]
pub enum FolderAction {
    /// Create a folder
    Add { name: String },

    /// Rename a folder
    Rename {
        /// Current name or id
        folder: String,
        new_name: String,
    },

    /// Delete a folder (its items move to "Ungrouped" unless --cascade)
    Delete {
        /// Name or id
        folder: String,
        /// Delete the folder's items too
        #[arg(long)]
        cascade: bool,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List folders
    List,
}

/// Item subcommands.
#[derive(clap::Subcommand)]
pub enum ItemAction {
    /// Add a credential (default) or a secure note
    Add {
        name: String,
        /// Folder name or id (default: Ungrouped)
        #[arg(long)]
        folder: Option<String>,
        /// Store a secure note instead of a credential
        #[arg(long)]
        note: bool,
        /// Login name
        #[arg(long)]
        login: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Extra field as LABEL=VALUE (repeatable)
        #[arg(long = "field", value_name = "LABEL=VALUE")]
        fields: Vec<String>,
        /// Note text (otherwise read from stdin)
        #[arg(long)]
        content: Option<String>,
    },

    /// Change fields of an item
    Edit {
        /// Item name or id
        item: String,
        #[arg(long)]
        name: Option<String>,
        /// Move to another folder (name or id)
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        login: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Prompt for (or read from stdin) a new secret
        #[arg(long)]
        secret: bool,
        /// New note text
        #[arg(long)]
        content: Option<String>,
    },

    /// Show an item
    Show {
        /// Item name or id
        item: String,
        /// Print the secret in clear text
        #[arg(long)]
        reveal: bool,
    },

    /// Delete an item
    Delete {
        /// Item name or id
        item: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List items
    List {
        /// Only items of this folder (name or id)
        #[arg(long)]
        folder: Option<String>,
    },
}

/// Auth subcommands for keyring management.
#[derive(clap::Subcommand)]
pub enum AuthAction {
    /// Save the vault key to the OS keyring (unlock without password)
    Keyring {
        /// Remove the key from the keyring instead of saving
        #[arg(long)]
        delete: bool,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Resolved locations for one invocation.
pub struct Context {
    pub project_dir: PathBuf,
    pub settings: Settings,
    pub vault_dir: PathBuf,
}

impl Context {
    /// Load `.credvault.toml` from the working directory and apply
    /// command-line overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let project_dir = std::env::current_dir()?;
        let settings = Settings::load(&project_dir)?;
        let vault_dir = match &cli.vault_dir {
            Some(dir) => project_dir.join(dir),
            None => settings.vault_dir_path(&project_dir),
        };
        Ok(Self {
            project_dir,
            settings,
            vault_dir,
        })
    }

    pub fn blob_store(&self) -> FileBlobStore {
        FileBlobStore::in_dir(&self.vault_dir)
    }

    /// Identifier used for the keyring entry.
    pub fn vault_id(&self) -> String {
        self.vault_dir.to_string_lossy().to_string()
    }
}

/// An unlocked vault loaded from disk.
pub struct OpenVault {
    pub ctx: Context,
    pub credentials: VaultCredentials,
    pub key: EncryptionKey,
    pub store: VaultStore,
}

impl OpenVault {
    /// Unlock with the CLI prompt chain and decrypt the local vault file.
    pub fn open(cli: &Cli) -> Result<Self> {
        let ctx = Context::load(cli)?;
        let prompt = CliPrompt::new(cli.username.clone(), ctx.vault_id());
        Self::open_with(ctx, &prompt)
    }

    pub fn open_with(ctx: Context, prompt: &dyn CredentialPrompt) -> Result<Self> {
        let credentials = load_credentials(&ctx.vault_dir)?;
        let mut session = VaultSession::unlock(prompt, &credentials, None)?;
        let key = session.key()?;

        let blob_store = ctx.blob_store();
        if !blob_store.exists() {
            return Err(CredVaultError::VaultNotFound(blob_store.path().to_path_buf()));
        }
        let blob = blob_store.load_blocking()?;
        let snapshot = decrypt_snapshot(&blob, &key).map_err(|e| match e {
            CodecError::AuthenticationFailed => CredVaultError::CorruptVault(format!(
                "{} does not decrypt with this key",
                blob_store.path().display()
            )),
            other => CredVaultError::Codec(other),
        })?;
        let store = VaultStore::from_snapshot(snapshot)?;
        debug!(
            folders = store.folders().len(),
            items = store.items().len(),
            "vault opened"
        );

        Ok(Self {
            ctx,
            credentials,
            key,
            store,
        })
    }

    /// Re-encrypt the store and write it back atomically.
    pub fn save(&self) -> Result<()> {
        let blob = encrypt_snapshot(&self.store.export(), &self.key)?;
        self.ctx.blob_store().save_blocking(&blob)?;
        Ok(())
    }

    pub fn vault_dir(&self) -> &Path {
        &self.ctx.vault_dir
    }

    /// Find a live folder by id or (case-insensitive) name.
    pub fn resolve_folder(&self, name_or_id: &str) -> Result<Folder> {
        self.store
            .folder(name_or_id)
            .or_else(|| self.store.folder_by_name(name_or_id))
            .cloned()
            .ok_or_else(|| CredVaultError::FolderNotFound(name_or_id.to_string()))
    }

    /// Find a live item by id or by a unique (case-insensitive) name.
    pub fn resolve_item(&self, name_or_id: &str) -> Result<Item> {
        if let Some(item) = self.store.item(name_or_id) {
            return Ok(item.clone());
        }
        let wanted = name_or_id.trim().to_lowercase();
        let matches: Vec<&Item> = self
            .store
            .items()
            .into_iter()
            .filter(|i| i.name.to_lowercase() == wanted)
            .collect();
        match matches.as_slice() {
            [] => Err(CredVaultError::ItemNotFound(name_or_id.to_string())),
            [one] => Ok((*one).clone()),
            many => Err(CredVaultError::Validation(format!(
                "{} items are named '{name_or_id}' — use the item id instead",
                many.len()
            ))),
        }
    }
}

/// `CredentialPrompt` for the terminal: environment variable, OS
/// keyring (when compiled in), then an interactive prompt.
pub struct CliPrompt {
    username: Option<String>,
    vault_id: String,
}

impl CliPrompt {
    pub fn new(username: Option<String>, vault_id: String) -> Self {
        Self { username, vault_id }
    }
}

impl CredentialPrompt for CliPrompt {
    fn username(&self) -> Result<Option<String>> {
        Ok(self.username.clone())
    }

    fn master_password(&self) -> Result<Zeroizing<String>> {
        prompt_password()
    }

    fn stored_key(&self) -> Result<Option<EncryptionKey>> {
        // Keyring problems are never fatal; fall back to the password.
        #[cfg(feature = "keyring-store")]
        match crate::keyring::load_key(&self.vault_id) {
            Ok(found) => return Ok(found),
            Err(e) => debug!(error = %e, "keyring lookup failed"),
        }

        #[cfg(not(feature = "keyring-store"))]
        let _ = &self.vault_id;

        Ok(None)
    }
}

/// Get the master password, trying in order:
/// 1. `CREDVAULT_PASSWORD` env var (scripts/CI)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = password_from_env() {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter master password")
        .interact()
        .map_err(|e| CredVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new master password with confirmation (`init`, `passwd`).
///
/// `env_var` lets scripted runs supply it; `passwd` uses
/// `CREDVAULT_NEW_PASSWORD` so it does not collide with the current one.
pub fn prompt_new_password(env_var: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(env_var) {
        if !pw.is_empty() {
            crypto::validate_new_password(&pw)?;
            warn_if_weak(&pw);
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt("Choose master password")
                .with_confirmation(
                    "Confirm master password",
                    "Passwords do not match, try again",
                )
                .interact()
                .map_err(|e| CredVaultError::CommandFailed(format!("password prompt: {e}")))?,
        );

        if let Err(e) = crypto::validate_new_password(&password) {
            output::warning(&format!("{e}. Try again."));
            continue;
        }

        warn_if_weak(&password);
        return Ok(password);
    }
}

/// Ask for the account name when neither `--username` nor
/// `CREDVAULT_USERNAME` supplied one.
pub fn prompt_username(cli: &Cli) -> Result<String> {
    let username = match &cli.username {
        Some(name) => name.clone(),
        None => dialoguer::Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(|e| CredVaultError::CommandFailed(format!("username prompt: {e}")))?,
    };
    let username = username.trim().to_string();
    if username.is_empty() {
        return Err(CredVaultError::Validation("username cannot be empty".into()));
    }
    Ok(username)
}

/// Print a warning when a password rates below Medium.
pub fn warn_if_weak(password: &str) {
    let strength = crypto::estimate_strength(password);
    if strength.label < StrengthLabel::Medium {
        output::warning(&format!(
            "Password strength: {} — consider a longer password with mixed characters.",
            strength.label
        ));
    }
}

fn password_from_env() -> Option<Zeroizing<String>> {
    match std::env::var("CREDVAULT_PASSWORD") {
        Ok(pw) if !pw.is_empty() => Some(Zeroizing::new(pw)),
        _ => None,
    }
}

/// Record an audit event when the audit log is compiled in.
pub fn audit(vault_dir: &Path, op: &str, target: Option<&str>, details: Option<&str>) {
    #[cfg(feature = "audit-log")]
    crate::audit::log_audit(vault_dir, op, target, details);

    #[cfg(not(feature = "audit-log"))]
    let _ = (vault_dir, op, target, details);
}
