//! `credvault completions <SHELL>` — print a completion script to stdout.

use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::errors::Result;

/// Execute the `completions` command.
pub fn execute(shell: Shell) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_completions(shell, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Render the script for `shell` into `out`.
fn write_completions(shell: Shell, out: &mut dyn Write) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "credvault", out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn bash_script_offers_vault_subcommands() {
        let script = script(Shell::Bash);
        for sub in ["folder", "item", "backup", "restore", "passwd"] {
            assert!(script.contains(sub), "missing {sub}");
        }
    }

    #[test]
    fn zsh_script_declares_the_binary() {
        assert!(script(Shell::Zsh).contains("#compdef credvault"));
    }
}
