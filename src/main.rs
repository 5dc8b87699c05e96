//! packd - bundle service entry point
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use packd::cli::{Cli, Commands};
use packd::config::ConfigManager;
use packd::error::PackdResult;
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

async fn run() -> PackdResult<()> {
    let cli = Cli::parse();

    // Key command is offline and needs neither config nor logging
    if let Commands::Key(args) = cli.command {
        return packd::cli::commands::key(args);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);

    match cli.command {
        Commands::Key(_) => unreachable!("Key handled above"),
        Commands::Serve(args) => packd::cli::commands::serve(args, &config).await,
        Commands::Config(args) => packd::cli::commands::config(args, &config, &config_manager).await,
        Commands::Cache(args) => packd::cli::commands::cache(args, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("packd=warn"),
        1 => EnvFilter::new("packd=info"),
        _ => EnvFilter::new("packd=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
