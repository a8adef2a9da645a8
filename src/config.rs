//! Configuration management for Chatloom
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Chatloom
///
/// Every section falls back to its defaults, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Chat naming and titling
    #[serde(default)]
    pub chat: ChatConfig,
    /// Stream consumption settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat naming and titling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Name stamped onto AI messages
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Name stamped onto human messages
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Title used when the first message is blank
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Longest title derived from a first message, in characters
    #[serde(default = "default_title_max_length")]
    pub title_max_length: usize,
}

fn default_assistant_name() -> String {
    "AI".to_string()
}

fn default_user_name() -> String {
    "User".to_string()
}

fn default_title() -> String {
    "New Chat".to_string()
}

fn default_title_max_length() -> usize {
    50
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            user_name: default_user_name(),
            default_title: default_title(),
            title_max_length: default_title_max_length(),
        }
    }
}

/// Stream consumption settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Chunks buffered between producer and consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds to wait for the next chunk; 0 waits forever
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_idle_timeout_seconds() -> u64 {
    60
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
        }
    }
}

impl StreamConfig {
    /// The idle timeout, or `None` when disabled
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::config::StreamConfig;
    /// use std::time::Duration;
    ///
    /// let mut config = StreamConfig::default();
    /// assert_eq!(config.idle_timeout(), Some(Duration::from_secs(60)));
    /// config.idle_timeout_seconds = 0;
    /// assert_eq!(config.idle_timeout(), None);
    /// ```
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_seconds > 0).then(|| Duration::from_secs(self.idle_timeout_seconds))
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the `chatloom` target when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable logs
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file yields the defaults. Nothing is logged here because the
    /// subscriber is configured from the result; see [`Config::file_exists`].
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Self::file_exists(path) {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Returns true when `path` names an existing configuration file
    pub fn file_exists(path: &str) -> bool {
        Path::new(path).exists()
    }

    /// Parses a configuration file without applying overrides
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the file cannot be read or parsed
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(name) = std::env::var("CHATLOOM_ASSISTANT_NAME") {
            self.chat.assistant_name = name;
        }

        if let Ok(name) = std::env::var("CHATLOOM_USER_NAME") {
            self.chat.user_name = name;
        }

        if let Ok(title) = std::env::var("CHATLOOM_DEFAULT_TITLE") {
            self.chat.default_title = title;
        }

        if let Ok(max_len) = std::env::var("CHATLOOM_TITLE_MAX_LENGTH") {
            if let Ok(value) = max_len.parse() {
                self.chat.title_max_length = value;
            } else {
                tracing::warn!("Invalid CHATLOOM_TITLE_MAX_LENGTH: {}", max_len);
            }
        }

        if let Ok(capacity) = std::env::var("CHATLOOM_CHANNEL_CAPACITY") {
            if let Ok(value) = capacity.parse() {
                self.stream.channel_capacity = value;
            } else {
                tracing::warn!("Invalid CHATLOOM_CHANNEL_CAPACITY: {}", capacity);
            }
        }

        if let Ok(timeout) = std::env::var("CHATLOOM_IDLE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.stream.idle_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATLOOM_IDLE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(level) = std::env::var("CHATLOOM_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json) = std::env::var("CHATLOOM_LOG_JSON") {
            match json.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json_format = true,
                "0" | "false" | "no" => self.logging.json_format = false,
                other => tracing::warn!("Invalid CHATLOOM_LOG_JSON: {}", other),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.chat.assistant_name.trim().is_empty() {
            return Err(
                ChatError::Config("chat.assistant_name cannot be empty".to_string()).into(),
            );
        }

        if self.chat.user_name.trim().is_empty() {
            return Err(ChatError::Config("chat.user_name cannot be empty".to_string()).into());
        }

        if self.chat.default_title.trim().is_empty() {
            return Err(
                ChatError::Config("chat.default_title cannot be empty".to_string()).into(),
            );
        }

        // Room for at least one character plus the ellipsis
        if self.chat.title_max_length < 4 {
            return Err(ChatError::Config(
                "chat.title_max_length must be at least 4".to_string(),
            )
            .into());
        }

        if self.stream.channel_capacity == 0 {
            return Err(ChatError::Config(
                "stream.channel_capacity must be greater than 0".to_string(),
            )
            .into());
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ChatError::Config(format!(
                "Invalid logging.level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn cli(verbose: bool) -> crate::cli::Cli {
        crate::cli::Cli {
            config: None,
            verbose,
            command: crate::cli::Commands::Validate {
                fixture: "fixture.yaml".into(),
            },
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chat.assistant_name, "AI");
        assert_eq!(config.chat.user_name, "User");
        assert_eq!(config.chat.default_title, "New Chat");
        assert_eq!(config.chat.title_max_length, 50);
        assert_eq!(config.stream.channel_capacity, 64);
        assert_eq!(config.stream.idle_timeout_seconds, 60);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_assistant_name() {
        let mut config = Config::default();
        config.chat.assistant_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_short_title_length() {
        let mut config = Config::default();
        config.chat.title_max_length = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_capacity() {
        let mut config = Config::default();
        config.stream.channel_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity"));
    }

    #[test]
    fn test_config_validation_invalid_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml_partial() {
        let yaml = r#"
chat:
  assistant_name: Helper
stream:
  idle_timeout_seconds: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chat.assistant_name, "Helper");
        assert_eq!(config.chat.user_name, "User");
        assert_eq!(config.stream.idle_timeout(), None);
        assert_eq!(config.stream.channel_capacity, 64);
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent.yaml", &cli(false)).unwrap();
        assert_eq!(config.chat.default_title, "New Chat");
    }

    #[test]
    fn test_file_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(Config::file_exists(&file.path().to_string_lossy()));
        assert!(!Config::file_exists("nonexistent.yaml"));
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat:\n  default_title: Untitled\nlogging:\n  json_format: true").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::load(&path, &cli(false)).unwrap();
        assert_eq!(config.chat.default_title, "Untitled");
        assert!(config.logging.json_format);
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat: [not, a, map").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let err = Config::load(&path, &cli(false)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatError>(),
            Some(ChatError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("CHATLOOM_ASSISTANT_NAME", "Robot");
        std::env::set_var("CHATLOOM_IDLE_TIMEOUT_SECONDS", "5");
        std::env::set_var("CHATLOOM_CHANNEL_CAPACITY", "not-a-number");

        let config = Config::load("nonexistent.yaml", &cli(false)).unwrap();

        std::env::remove_var("CHATLOOM_ASSISTANT_NAME");
        std::env::remove_var("CHATLOOM_IDLE_TIMEOUT_SECONDS");
        std::env::remove_var("CHATLOOM_CHANNEL_CAPACITY");

        assert_eq!(config.chat.assistant_name, "Robot");
        assert_eq!(config.stream.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.stream.channel_capacity, 64);
    }

    #[test]
    #[serial]
    fn test_verbose_raises_log_level() {
        let config = Config::load("nonexistent.yaml", &cli(true)).unwrap();
        assert_eq!(config.logging.level, "debug");
    }
}
