//! `credvault restore` — merge a backup into the local vault.
//!
//! Usage:
//!   credvault restore                        # merge from backup_dir
//!   credvault restore --mode overwrite       # replace local contents
//!   credvault restore --from ./old.cvault    # merge a specific file

use crate::cli::commands::{backup_dir, block_on, coordinator_for};
use crate::cli::output;
use crate::cli::{audit, Cli, OpenVault};
use crate::errors::{CredVaultError, Result};
use crate::merge::MergeMode;
use crate::sync::SyncOutcome;
use crate::vault::EncryptedBlob;

/// Execute the `restore` command.
pub fn execute(cli: &Cli, mode: &str, from: Option<&str>, dir: Option<&str>) -> Result<()> {
    let mode: MergeMode = mode.parse().map_err(CredVaultError::Validation)?;
    let vault = OpenVault::open(cli)?;

    let outcome = match from {
        Some(file) => {
            let path = vault.ctx.project_dir.join(file);
            let blob = EncryptedBlob::from_bytes(std::fs::read(&path)?);
            let source = vault.ctx.project_dir.clone();
            let (ctx, coordinator) = coordinator_for(vault, source);
            let outcome = block_on(coordinator.import(blob, mode))??;
            (ctx, outcome)
        }
        None => {
            let source = backup_dir(&vault.ctx, dir)?;
            let (ctx, coordinator) = coordinator_for(vault, source);
            let outcome = block_on(coordinator.restore(mode))??;
            (ctx, outcome)
        }
    };

    let (ctx, outcome) = outcome;
    let SyncOutcome::Restored {
        conflicts,
        persisted,
    } = outcome
    else {
        return Ok(());
    };

    #[cfg(feature = "audit-log")]
    crate::audit::log_conflicts(&ctx.vault_dir, &conflicts);
    let details = format!("mode={mode:?}, conflicts={}", conflicts.len());
    audit(&ctx.vault_dir, "restore", None, Some(&details));

    if !persisted {
        return Err(CredVaultError::CommandFailed(
            "backup was merged but the local vault file could not be written".into(),
        ));
    }

    if conflicts.is_empty() {
        output::success("Backup restored with no conflicts.");
    } else {
        output::print_conflicts_table(&conflicts);
        output::success("Backup restored.");
    }

    Ok(())
}
