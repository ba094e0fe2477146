//! Burrow - Build chroot and SDK cache manager
//!
//! CLI entry point that dispatches to subcommands.

use burrow::cli::{Cli, Commands};
use burrow::config::ConfigManager;
use burrow::error::BurrowResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> BurrowResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug, whichever of
    // -v and the configured baseline is louder
    let filter = match config.verbosity(cli.verbose) {
        0 => EnvFilter::new("burrow=warn"),
        1 => EnvFilter::new("burrow=info"),
        _ => EnvFilter::new("burrow=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Dispatch to command
    match cli.command {
        Commands::Create(args) => burrow::cli::commands::create(args, &config).await,
        Commands::Enter(args) => burrow::cli::commands::enter(args, &config).await,
        Commands::Update => burrow::cli::commands::update(&config).await,
        Commands::Sdk(args) => burrow::cli::commands::sdk(args, &config).await,
        Commands::Cache(args) => burrow::cli::commands::cache(args, &config).await,
        Commands::Delete(args) => burrow::cli::commands::delete(args, &config).await,
    }
}
