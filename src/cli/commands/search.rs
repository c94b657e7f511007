//! `credvault search` — find items by name, login or URL.

use crate::cli::output;
use crate::cli::{Cli, OpenVault};
use crate::errors::Result;

/// Execute the `search` command.
pub fn execute(cli: &Cli, query: &str) -> Result<()> {
    let vault = OpenVault::open(cli)?;
    let hits = vault.store.search(query);
    output::print_items_table(&vault.store, &hits);
    Ok(())
}
