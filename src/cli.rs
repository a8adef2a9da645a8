//! Command-line interface definition for Chatloom
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for replaying and validating conversation fixtures.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chatloom - conversation state core for streaming chat clients
///
/// Replays scripted conversations through the message store, stream
/// ingestion and revision resolver, and prints the active path.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatloom")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CHATLOOM_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Chatloom
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a fixture's actions and print the resulting conversation
    Replay {
        /// Path to the fixture file (YAML format)
        fixture: PathBuf,

        /// Print the active path as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a fixture's messages for broken links and cycles
    Validate {
        /// Path to the fixture file (YAML format)
        fixture: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_replay() {
        let cli = Cli::try_parse_from(["chatloom", "replay", "chat.yaml"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        assert!(!cli.verbose);
        match cli.command {
            Commands::Replay { fixture, json } => {
                assert_eq!(fixture, PathBuf::from("chat.yaml"));
                assert!(!json);
            }
            _ => panic!("Expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_replay_json() {
        let cli = Cli::try_parse_from(["chatloom", "replay", "chat.yaml", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Replay { json: true, .. }));
    }

    #[test]
    fn test_cli_parse_validate_with_globals() {
        let cli = Cli::try_parse_from([
            "chatloom",
            "--config",
            "custom.yaml",
            "-v",
            "validate",
            "chat.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }

    #[test]
    fn test_cli_requires_fixture() {
        assert!(Cli::try_parse_from(["chatloom", "replay"]).is_err());
        assert!(Cli::try_parse_from(["chatloom"]).is_err());
    }
}
