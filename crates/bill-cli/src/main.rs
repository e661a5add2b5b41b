use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bill_cli::commands::{init, invoice};
use bill_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match &cli.command {
        Some(Commands::Invoice(args)) => invoice::run(args, cli.config.as_deref())?,
        Some(Commands::Init { username }) => init::run(username, cli.config.as_deref())?,
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
