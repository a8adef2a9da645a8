//! Chatloom - conversation state core for streaming chat clients
//!
#![doc = "Chatloom - conversation state core for streaming chat clients"]
#![doc = "Main entry point for the chatloom command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatloom::cli::{Cli, Commands};
use chatloom::commands;
use chatloom::config::{Config, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing from the loaded logging section
    init_tracing(&config.logging);
    if !Config::file_exists(config_path) {
        tracing::warn!("Config file not found at {}, using defaults", config_path);
    }

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Replay { fixture, json } => {
            tracing::info!("Starting replay of {}", fixture.display());
            commands::run_replay(config, &fixture, json).await?;
            Ok(())
        }
        Commands::Validate { fixture } => {
            tracing::info!("Validating {}", fixture.display());
            commands::run_validate(&fixture)?;
            Ok(())
        }
    }
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins over `logging.level`. Logs go to stderr so command output
/// on stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatloom={}", logging.level.to_lowercase())));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
