// Concierge festival assistant
// Main entry point for the concierge binary

use clap::Parser;
use concierge_engine::cli::{Cli, Command};
use concierge_engine::config::Config;
use concierge_engine::handlers::{
    handle_ask, handle_chat, handle_doctor, handle_festivals, handle_history, handle_memory,
    AlreadyReported, OutputFormat,
};
use concierge_engine::telemetry::init_telemetry_with_level;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Turn errors are printed by the handler in the requested format
            if !err.is::<AlreadyReported>() {
                eprintln!("Error: {:?}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config level; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Concierge v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Ask { input } => {
            tracing::info!("Answering request");
            handle_ask(input, &config, format).await
        }

        Command::Chat => {
            tracing::info!("Starting interactive session");
            handle_chat(&config, format).await
        }

        Command::Festivals {
            query,
            category,
            day,
            time,
        } => {
            tracing::info!(?query, ?category, %day, %time, "Listing festivals");
            handle_festivals(query, category, day, time, &config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} conversations", limit);
            handle_history(limit, &config, format).await
        }

        Command::Memory { action } => {
            tracing::info!("Memory management: {:?}", action);
            handle_memory(action, &config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
