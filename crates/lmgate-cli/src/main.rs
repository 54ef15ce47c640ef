//! CLI entry point - command dispatch only.
//!
//! All wiring lives in `commands`; this file parses arguments, loads the
//! environment, and initializes tracing.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lmgate_cli::{Cli, Commands, commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve(args) => commands::serve(args).await,
        Commands::Status(args) => commands::status(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
