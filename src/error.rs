//! Error types for Chatloom
//!
//! This module defines the error taxonomy of the conversation core,
//! using `thiserror` for ergonomic error handling. Transport failures are
//! normally folded into a terminal message status instead of being returned;
//! the variants here cover what callers may still need to branch on.

use thiserror::Error;

/// Main error type for Chatloom operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// An operation referenced a message id the store does not know
    #[error("Message not found: {0}")]
    NotFound(String),

    /// The transport failed while a response was streaming
    #[error("Stream error for message {message_id}: {reason}")]
    Stream {
        /// The AI message whose stream failed
        message_id: String,
        /// Transport-provided description of the failure
        reason: String,
    },

    /// An alternative-navigation index no longer fits its group
    #[error("Stale selection: index {index} is out of range for {len} alternatives")]
    StaleSelection {
        /// The pinned, zero-based index
        index: usize,
        /// Current size of the alternative group
        len: usize,
    },

    /// The `previous_message_id` links contain a cycle
    #[error("Cycle detected in conversation chain at message {0}")]
    CycleDetected(String),

    /// The transport rejected a request before streaming began
    #[error("Transport error: {0}")]
    Transport(String),

    /// A model selection is not present in the catalog
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A user intent does not apply to the targeted message
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fixture loading or validation errors
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Chatloom operations
///
/// Uses `anyhow::Error` so context can be attached while propagating;
/// callers that need to branch can `downcast_ref::<ChatError>()`.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_display() {
        let error = ChatError::NotFound("msg-42".to_string());
        assert_eq!(error.to_string(), "Message not found: msg-42");
    }

    #[test]
    fn test_stream_error_display() {
        let error = ChatError::Stream {
            message_id: "ai-1".to_string(),
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Stream error for message ai-1: connection reset"
        );
    }

    #[test]
    fn test_stale_selection_error_display() {
        let error = ChatError::StaleSelection { index: 3, len: 2 };
        assert!(error.to_string().contains("index 3"));
        assert!(error.to_string().contains("2 alternatives"));
    }

    #[test]
    fn test_cycle_detected_error_display() {
        let error = ChatError::CycleDetected("msg-1".to_string());
        assert_eq!(
            error.to_string(),
            "Cycle detected in conversation chain at message msg-1"
        );
    }

    #[test]
    fn test_config_error_display() {
        let error = ChatError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ChatError = io_error.into();
        assert!(matches!(error, ChatError::Io(_)));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let result: Result<()> = Err(ChatError::NotFound("x".to_string()).into());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatError>(),
            Some(ChatError::NotFound(id)) if id == "x"
        ));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatError>();
    }
}
