//! Chat API transport abstraction
//!
//! This module defines the [`ChatTransport`] trait the conversation core
//! talks to. Real implementations (HTTP, WebSocket) live outside this crate;
//! [`scripted::ScriptedTransport`] replays queued replies in-process and
//! backs the tests and the `replay` command.
//!
//! # Design
//!
//! Every generating call returns a [`ChunkStream`]. Failures before the
//! stream starts are returned as `Err`; failures mid-stream are `Err` items
//! inside the stream. The controller turns both into message status, so the
//! rendering layer never sees them as errors.

use crate::conversation::{Message, ModelSelection, Session};
use crate::error::Result;
use crate::streaming::ChunkStream;
use serde::{Deserialize, Serialize};

pub mod models;
pub mod scripted;

pub use models::{ModelCatalog, ModelInfo};
pub use scripted::{ScriptedReply, ScriptedTransport, TransportCall};

/// Payload for sending a new human message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Target session
    pub session_id: String,
    /// Client-generated id of the human message
    pub message_id: String,
    /// The text the user typed
    pub message: String,
    /// The message being replied to
    pub previous_message_id: Option<String>,
    /// Model that should answer
    pub model: Option<ModelSelection>,
}

/// Payload for editing a human message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    /// Target session
    pub session_id: String,
    /// The message being edited
    pub edit_id: String,
    /// Client-generated id of the revision
    pub message_id: String,
    /// The new text
    pub message: String,
    /// Model that should answer
    pub model: Option<ModelSelection>,
}

/// Payload for regenerating an AI message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    /// Target session
    pub session_id: String,
    /// The AI message being retried
    pub retry_id: String,
    /// The message the retried reply answered
    pub previous_message_id: Option<String>,
    /// Model that should answer
    pub model: Option<ModelSelection>,
}

/// A session and all of its messages, as fetched from the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    /// Session metadata
    pub session: Session,
    /// Every message of the session, in any order
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Chat API as seen by the conversation core
///
/// # Examples
///
/// ```no_run
/// use chatloom::transport::{ChatTransport, ScriptedTransport};
///
/// // Controllers take any implementation; tests use the scripted one.
/// let transport = ScriptedTransport::new();
/// ```
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a human message and streams the reply
    async fn send_message(&self, request: SendMessageRequest) -> Result<ChunkStream>;

    /// Replaces a human message and streams the new reply
    async fn edit_message(&self, request: EditMessageRequest) -> Result<ChunkStream>;

    /// Streams an alternative to an AI message
    async fn regenerate_message(&self, request: RegenerateRequest) -> Result<ChunkStream>;

    /// Asks the server to stop generating `message_id`
    ///
    /// Must succeed for messages that already finished.
    async fn stop_generation(&self, session_id: &str, message_id: &str) -> Result<()>;

    /// Loads a session and its messages
    async fn fetch_conversation(&self, session_id: &str) -> Result<ConversationSnapshot>;

    /// Lists the models available per provider
    async fn fetch_models(&self) -> Result<ModelCatalog>;
}
