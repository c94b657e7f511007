//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::merge::{ConflictRecord, Resolution};
use crate::vault::{Folder, Item, ItemKind, VaultStore};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print folders with their item counts.
pub fn print_folders_table(store: &VaultStore, folders: &[&Folder]) {
    if folders.is_empty() {
        info("No folders in this vault yet.");
        tip("Run `credvault folder add <NAME>` to create one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Items", "Updated", "Id"]);

    for f in folders {
        table.add_row(vec![
            f.name.clone(),
            store.items_in_folder(&f.id).len().to_string(),
            f.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            f.id.clone(),
        ]);
    }

    println!("{table}");
}

/// Print items (never their secrets).
pub fn print_items_table(store: &VaultStore, items: &[&Item]) {
    if items.is_empty() {
        info("No items found.");
        tip("Run `credvault item add <NAME>` to add a credential.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Type", "Folder", "Login", "Updated", "Id"]);

    for i in items {
        let folder = store
            .folder(&i.folder_id)
            .map_or_else(|| "-".to_string(), |f| f.name.clone());
        let login = match &i.kind {
            ItemKind::Credential { username, .. } => username.clone().unwrap_or_default(),
            ItemKind::Note { .. } => String::new(),
        };
        table.add_row(vec![
            i.name.clone(),
            i.kind.label().to_string(),
            folder,
            login,
            i.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            i.id.clone(),
        ]);
    }

    println!("{table}");
}

/// Print the conflict report of a restore.
pub fn print_conflicts_table(conflicts: &[ConflictRecord]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Id", "Local rev", "Remote rev", "Resolution"]);

    for c in conflicts {
        let resolution = match &c.resolution {
            Resolution::KeptLocal => "kept local".to_string(),
            Resolution::TookRemote => "took backup".to_string(),
            Resolution::Renamed { from, to } => format!("renamed '{from}' → '{to}'"),
        };
        table.add_row(vec![
            c.entity_kind.to_string(),
            c.entity_id.clone(),
            c.local_revision.map_or_else(|| "-".into(), |r| r.to_string()),
            c.remote_revision.map_or_else(|| "-".into(), |r| r.to_string()),
            resolution,
        ]);
    }

    println!(
        "{}",
        style(format!("{} conflict(s) resolved:", conflicts.len())).bold()
    );
    println!("{table}");
}
