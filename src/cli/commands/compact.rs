//! `credvault compact` — drop deletion markers older than the retention
//! window.

use crate::cli::output;
use crate::cli::{audit, Cli, OpenVault};
use crate::errors::Result;

/// Execute the `compact` command.
pub fn execute(cli: &Cli, days: Option<u32>) -> Result<()> {
    let mut vault = OpenVault::open(cli)?;
    let retention = match days {
        Some(days) => chrono::Duration::days(i64::from(days)),
        None => vault.ctx.settings.tombstone_retention(),
    };

    let removed = vault.store.compact(retention, chrono::Utc::now());
    if removed == 0 {
        output::info("Nothing to compact.");
        return Ok(());
    }

    vault.save()?;
    let details = format!("{removed} markers older than {} days", retention.num_days());
    audit(vault.vault_dir(), "compact", None, Some(&details));
    output::success(&format!("Removed {removed} deletion marker(s)."));
    output::tip("Backups made before this may re-introduce the deleted records on merge.");

    Ok(())
}
