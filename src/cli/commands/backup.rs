//! `credvault backup` — encrypt the vault and copy it to the backup
//! directory.

use crate::cli::commands::{backup_dir, block_on, coordinator_for};
use crate::cli::output;
use crate::cli::{audit, Cli, OpenVault};
use crate::errors::Result;
use crate::sync::SyncOutcome;

/// Execute the `backup` command.
pub fn execute(cli: &Cli, to: Option<&str>) -> Result<()> {
    let vault = OpenVault::open(cli)?;
    let dir = backup_dir(&vault.ctx, to)?;
    std::fs::create_dir_all(&dir)?;

    let (ctx, coordinator) = coordinator_for(vault, dir.clone());
    let outcome = block_on(coordinator.backup())??;

    if let SyncOutcome::BackedUp { bytes } = outcome {
        let details = format!("{bytes} bytes to {}", dir.display());
        audit(&ctx.vault_dir, "backup", None, Some(&details));
        output::success(&format!("Backup written to {} ({bytes} bytes)", dir.display()));
    }

    Ok(())
}
