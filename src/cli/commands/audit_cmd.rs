//! `credvault audit` — display the audit log.
//!
//! Usage:
//!   credvault audit               # show last 50 entries
//!   credvault audit --last 20     # show last 20
//!   credvault audit --since 7d    # entries from last 7 days

use chrono::Utc;

use crate::cli::Cli;
use crate::errors::{CredVaultError, Result};

/// Execute the `audit` command.
#[cfg(feature = "audit-log")]
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    use crate::audit::AuditLog;
    use crate::cli::{output, Context};

    let ctx = Context::load(cli)?;

    let audit = AuditLog::open(&ctx.vault_dir)
        .ok_or_else(|| CredVaultError::AuditError("failed to open audit database".into()))?;

    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let entries = audit.query(last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

/// Execute the `audit` command (audit log not compiled in).
#[cfg(not(feature = "audit-log"))]
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let _ = (cli, last, since);
    Err(CredVaultError::AuditError(
        "audit log not compiled — rebuild with the `audit-log` feature".into(),
    ))
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();

    let (num_str, unit) = if let Some(s) = input.strip_suffix('d') {
        (s, 'd')
    } else if let Some(s) = input.strip_suffix('h') {
        (s, 'h')
    } else if let Some(s) = input.strip_suffix('m') {
        (s, 'm')
    } else {
        return Err(CredVaultError::CommandFailed(format!(
            "invalid duration '{input}' — use format like 7d, 24h, or 30m"
        )));
    };

    let num: i64 = num_str.parse().map_err(|_| {
        CredVaultError::CommandFailed(format!(
            "invalid duration '{input}' — number part is not valid"
        ))
    })?;

    let duration = match unit {
        'd' => chrono::Duration::days(num),
        'h' => chrono::Duration::hours(num),
        _ => chrono::Duration::minutes(num),
    };

    Ok(Utc::now() - duration)
}

/// Print audit entries in a formatted table.
#[cfg(feature = "audit-log")]
pub fn print_audit_table(entries: &[crate::audit::AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "Target", "Details"]);

    for entry in entries {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let op = colorize_operation(&entry.operation);
        let target = entry.target.as_deref().unwrap_or("-");
        let details = entry.details.as_deref().unwrap_or("-");

        table.add_row(vec![time, op, target.to_string(), details.to_string()]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize operation names for display.
fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "init" | "folder.add" | "item.add" => style(op).green().to_string(),
        "folder.rename" | "item.edit" => style(op).blue().to_string(),
        "folder.delete" | "item.delete" | "compact" => style(op).red().to_string(),
        "passwd" | "auth.keyring" => style(op).yellow().to_string(),
        "backup" | "restore" => style(op).cyan().to_string(),
        "conflict" => style(op).magenta().to_string(),
        _ => op.to_string(),
    }
}
