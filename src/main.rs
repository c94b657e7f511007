use clap::Parser;
use credvault::cli::commands;
use credvault::cli::{AuthAction, Cli, Commands};

/// Install the stderr log subscriber.  `CREDVAULT_LOG` takes an
/// `EnvFilter` directive; the default only shows warnings.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("CREDVAULT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("credvault=warn,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli),
        Commands::Folder { ref action } => commands::folder::execute(&cli, action),
        Commands::Item { ref action } => commands::item::execute(&cli, action),
        Commands::Search { ref query } => commands::search::execute(&cli, query),
        Commands::Backup { ref to } => commands::backup::execute(&cli, to.as_deref()),
        Commands::Restore {
            ref mode,
            ref from,
            ref dir,
        } => commands::restore::execute(&cli, mode, from.as_deref(), dir.as_deref()),
        Commands::Compact { days } => commands::compact::execute(&cli, days),
        Commands::Passwd => commands::passwd::execute(&cli),
        Commands::Auth { ref action } => match action {
            AuthAction::Keyring { delete } => commands::auth::execute_keyring(&cli, *delete),
        },
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Audit { last, ref since } => {
            commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
    };

    if let Err(e) = result {
        credvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
