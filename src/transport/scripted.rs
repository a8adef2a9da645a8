//! In-process scripted transport
//!
//! [`ScriptedTransport`] answers generating calls with replies queued ahead
//! of time and records every call it receives. Each reply is pushed through
//! an ordered chunk queue by a producer task, the same way a network
//! transport would feed chunks as they arrive.
//!
//! # Example
//!
//! ```
//! use chatloom::streaming::StreamChunk;
//! use chatloom::transport::{ScriptedReply, ScriptedTransport};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = ScriptedTransport::new();
//! transport
//!     .push_reply(ScriptedReply::chunks(vec![
//!         StreamChunk::begin("ai-1"),
//!         StreamChunk::item("ai-1", "Hi"),
//!         StreamChunk::end("ai-1"),
//!     ]))
//!     .await;
//! assert_eq!(transport.pending_replies().await, 1);
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ChatError, Result};
use crate::streaming::{chunk_channel, ChunkStream, StreamChunk};
use crate::transport::{
    ChatTransport, ConversationSnapshot, EditMessageRequest, ModelCatalog, RegenerateRequest,
    SendMessageRequest,
};

/// One queued answer to a generating call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScriptedReply {
    /// Chunks streamed in order
    #[serde(default)]
    pub chunks: Vec<StreamChunk>,
    /// Transport failure emitted after the chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Keep the stream open after the chunks until the consumer hangs up
    #[serde(default)]
    pub hold_open: bool,
    /// Reject the call itself before any chunk is streamed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject: Option<String>,
}

impl ScriptedReply {
    /// A reply that streams `chunks` and closes
    pub fn chunks(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// A reply whose call is rejected outright
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reject: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Keeps the stream open after the chunks
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Fails the stream after the chunks
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail = Some(reason.into());
        self
    }
}

/// A call received by the scripted transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `send_message`
    Send(SendMessageRequest),
    /// `edit_message`
    Edit(EditMessageRequest),
    /// `regenerate_message`
    Regenerate(RegenerateRequest),
    /// `stop_generation`
    Stop {
        /// Session of the stopped message
        session_id: String,
        /// The stopped message
        message_id: String,
    },
    /// `fetch_conversation`
    FetchConversation(String),
    /// `fetch_models`
    FetchModels,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<ScriptedReply>,
    calls: Vec<TransportCall>,
    conversations: HashMap<String, ConversationSnapshot>,
    models: ModelCatalog,
}

/// Transport that replays queued replies
///
/// Cloning shares the script, so a test can keep one clone to inspect
/// calls while the controller owns another.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
    channel_capacity: usize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Creates a transport with an empty script
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Creates a transport whose chunk queues hold `channel_capacity` chunks
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            channel_capacity,
        }
    }

    /// Queues the answer to the next generating call
    pub async fn push_reply(&self, reply: ScriptedReply) {
        self.state.lock().await.replies.push_back(reply);
    }

    /// Registers a conversation returned by `fetch_conversation`
    pub async fn insert_conversation(&self, snapshot: ConversationSnapshot) {
        self.state
            .lock()
            .await
            .conversations
            .insert(snapshot.session.id.clone(), snapshot);
    }

    /// Sets the catalog returned by `fetch_models`
    pub async fn set_models(&self, models: ModelCatalog) {
        self.state.lock().await.models = models;
    }

    /// Every call received so far
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of replies not consumed yet
    pub async fn pending_replies(&self) -> usize {
        self.state.lock().await.replies.len()
    }

    async fn next_stream(&self, call: TransportCall) -> Result<ChunkStream> {
        let reply = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            state.replies.pop_front()
        };
        let Some(reply) = reply else {
            return Err(ChatError::Transport("no scripted reply queued".to_string()).into());
        };
        if let Some(reason) = reply.reject {
            return Err(ChatError::Transport(reason).into());
        }

        let (tx, stream) = chunk_channel(self.channel_capacity);
        tokio::spawn(async move {
            for chunk in reply.chunks {
                if tx.send(chunk).await.is_err() {
                    tracing::debug!("Scripted reply abandoned by consumer");
                    return;
                }
            }
            if let Some(reason) = reply.fail {
                let _ = tx.fail(reason).await;
                return;
            }
            if reply.hold_open {
                tx.closed().await;
            }
        });
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send_message(&self, request: SendMessageRequest) -> Result<ChunkStream> {
        self.next_stream(TransportCall::Send(request)).await
    }

    async fn edit_message(&self, request: EditMessageRequest) -> Result<ChunkStream> {
        self.next_stream(TransportCall::Edit(request)).await
    }

    async fn regenerate_message(&self, request: RegenerateRequest) -> Result<ChunkStream> {
        self.next_stream(TransportCall::Regenerate(request)).await
    }

    async fn stop_generation(&self, session_id: &str, message_id: &str) -> Result<()> {
        self.state.lock().await.calls.push(TransportCall::Stop {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn fetch_conversation(&self, session_id: &str) -> Result<ConversationSnapshot> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(TransportCall::FetchConversation(session_id.to_string()));
        state
            .conversations
            .get(session_id)
            .cloned()
            .ok_or_else(|| ChatError::Transport(format!("unknown session: {}", session_id)).into())
    }

    async fn fetch_models(&self) -> Result<ModelCatalog> {
        let mut state = self.state.lock().await;
        state.calls.push(TransportCall::FetchModels);
        Ok(state.models.clone())
    }
}
