//! Chatloom - conversation state core for streaming chat clients
//!
//! This library keeps the state of a branching chat conversation: every
//! message ever produced in a session, the streamed AI replies being folded
//! into them, and the single linear path the user is looking at.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `conversation`: Messages, sessions, the message store, the revision
//!   graph resolver and the chat controller
//! - `streaming`: Stream chunks, chunk queues and stream ingestion
//! - `transport`: The chat API abstraction and a scripted implementation
//! - `commands`: Fixture replay and validation commands
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatloom::conversation::ChatController;
//! use chatloom::transport::ScriptedTransport;
//! use chatloom::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let mut chat = ChatController::new("session-1", ScriptedTransport::new(), config);
//!     chat.submit("Hello, AI!").await?;
//!     for view in chat.active_path()? {
//!         println!("{}: {}", view.message.name, view.message.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{ChatController, Message, MessageStatus, MessageStore, Session};
pub use error::{ChatError, Result};
pub use streaming::{StreamChunk, StreamIngestor};
pub use transport::ChatTransport;

#[cfg(test)]
pub mod test_utils;
