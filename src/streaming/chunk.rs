//! Stream chunk types and chunk queues
//!
//! A streamed AI reply arrives as a sequence of chunks framed by `begin` and
//! `end`. Chunks are consumed and folded into a [`Message`] by the
//! ingestor; they are never stored themselves.
//!
//! [`Message`]: crate::conversation::Message

use crate::error::{ChatError, Result};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Lifecycle phase of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Opens a response; content is empty
    Begin,
    /// Carries an incremental text fragment
    Item,
    /// Closes a response successfully; content is empty
    End,
    /// Closes a response with a failure; content may describe it
    Error,
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Item => write!(f, "item"),
            Self::End => write!(f, "end"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Routing and ordering information attached to every chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// The AI message this chunk belongs to
    pub message_id: String,
    /// The message the AI message replies to
    #[serde(default)]
    pub previous_message_id: Option<String>,
    /// Set when the AI message regenerates another one
    #[serde(default)]
    pub retry_of_message_id: Option<String>,
    /// Workflow execution producing the reply
    #[serde(default)]
    pub execution_id: Option<String>,
    /// Run counter within the execution
    #[serde(default)]
    pub run_index: u32,
    /// Item counter within the run
    #[serde(default)]
    pub item_index: u32,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
}

impl ChunkMetadata {
    /// Metadata addressing `message_id`
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            ..Self::default()
        }
    }
}

/// One fragment of a streamed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    /// Lifecycle phase
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Text fragment, empty for `begin`/`end`
    #[serde(default)]
    pub content: String,
    /// Routing and ordering fields
    pub metadata: ChunkMetadata,
}

impl StreamChunk {
    /// A `begin` chunk
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::streaming::{ChunkType, StreamChunk};
    ///
    /// let chunk = StreamChunk::begin("ai-message-123").with_previous("msg-1");
    /// assert_eq!(chunk.chunk_type, ChunkType::Begin);
    /// assert_eq!(chunk.message_id(), "ai-message-123");
    /// assert_eq!(chunk.metadata.previous_message_id.as_deref(), Some("msg-1"));
    /// ```
    pub fn begin(message_id: impl Into<String>) -> Self {
        Self::new(ChunkType::Begin, message_id, String::new())
    }

    /// An `item` chunk carrying `content`
    pub fn item(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ChunkType::Item, message_id, content)
    }

    /// An `end` chunk
    pub fn end(message_id: impl Into<String>) -> Self {
        Self::new(ChunkType::End, message_id, String::new())
    }

    /// An `error` chunk with a failure description
    pub fn error(message_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ChunkType::Error, message_id, reason)
    }

    fn new(chunk_type: ChunkType, message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chunk_type,
            content: content.into(),
            metadata: ChunkMetadata::new(message_id),
        }
    }

    /// Sets the message the reply answers
    pub fn with_previous(mut self, previous_message_id: impl Into<String>) -> Self {
        self.metadata.previous_message_id = Some(previous_message_id.into());
        self
    }

    /// Marks the reply as a regeneration of another AI message
    pub fn with_retry_of(mut self, retry_of_message_id: impl Into<String>) -> Self {
        self.metadata.retry_of_message_id = Some(retry_of_message_id.into());
        self
    }

    /// Sets the workflow execution id
    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.metadata.execution_id = Some(execution_id.into());
        self
    }

    /// Sets run and item ordering indices
    pub fn with_indices(mut self, run_index: u32, item_index: u32) -> Self {
        self.metadata.run_index = run_index;
        self.metadata.item_index = item_index;
        self
    }

    /// The AI message this chunk belongs to
    pub fn message_id(&self) -> &str {
        &self.metadata.message_id
    }
}

/// A stream of chunks as produced by a transport
///
/// `Err` items signal a transport failure; the ingestor records them as a
/// terminal message status.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Producer side of a chunk queue
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Result<StreamChunk>>,
}

impl ChunkSender {
    /// Queues a chunk
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] when the consumer has gone away
    pub async fn send(&self, chunk: StreamChunk) -> Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| ChatError::Transport("chunk consumer dropped".to_string()).into())
    }

    /// Queues a transport failure
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] when the consumer has gone away
    pub async fn fail(&self, reason: impl Into<String>) -> Result<()> {
        let error = ChatError::Transport(reason.into());
        self.tx
            .send(Err(error.into()))
            .await
            .map_err(|_| ChatError::Transport("chunk consumer dropped".to_string()).into())
    }

    /// Returns true once the consumer stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits until the consumer stops listening
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Creates an ordered chunk queue
///
/// Chunks come out of the stream in the order they were sent. The stream
/// ends once every sender is dropped.
///
/// # Examples
///
/// ```
/// use chatloom::streaming::{chunk_channel, StreamChunk};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (tx, mut stream) = chunk_channel(8);
/// tx.send(StreamChunk::begin("ai-1")).await.unwrap();
/// drop(tx);
/// let first = stream.next().await.unwrap().unwrap();
/// assert_eq!(first.message_id(), "ai-1");
/// assert!(stream.next().await.is_none());
/// # }
/// ```
pub fn chunk_channel(capacity: usize) -> (ChunkSender, ChunkStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChunkSender { tx }, Box::pin(ReceiverStream::new(rx)))
}
