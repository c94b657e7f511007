//! One module per CLI subcommand.

pub mod audit_cmd;
pub mod auth;
pub mod backup;
pub mod compact;
pub mod completions;
pub mod folder;
pub mod init;
pub mod item;
pub mod passwd;
pub mod restore;
pub mod search;

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::cli::{Context, OpenVault};
use crate::errors::{CredVaultError, Result};
use crate::sync::{
    DirectoryTransport, FileBlobStore, SyncCoordinator, SyncSession, VaultSession,
};

/// Run one async sync operation on a single-threaded runtime.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(fut))
}

/// The backup directory from `--to`/`--dir` or the config file.
pub(crate) fn backup_dir(ctx: &Context, flag: Option<&str>) -> Result<PathBuf> {
    match flag {
        Some(dir) => Ok(ctx.project_dir.join(dir)),
        None => ctx.settings.backup_path(&ctx.project_dir).ok_or_else(|| {
            CredVaultError::ConfigError(
                "no backup directory — pass one or set `backup_dir` in .credvault.toml".into(),
            )
        }),
    }
}

/// Hand an opened vault to a coordinator backed by a directory transport.
pub(crate) fn coordinator_for(vault: OpenVault, backup_dir: PathBuf) -> (Context, SyncCoordinator) {
    let OpenVault { ctx, key, store, .. } = vault;
    let session = VaultSession::unlocked(key, ctx.settings.auto_lock());
    let sync = SyncSession::new(
        Box::new(DirectoryTransport::new(backup_dir)),
        Arc::new(Mutex::new(session)),
    )
    .with_local_store(Box::new(FileBlobStore::in_dir(&ctx.vault_dir)));
    let coordinator = SyncCoordinator::new(
        Arc::new(Mutex::new(store)),
        sync,
        ctx.settings.sync_config(),
    );
    (ctx, coordinator)
}
