//! Stream ingestion
//!
//! Folds chunks into the [`MessageStore`]. Chunks for one message are applied
//! in arrival order; chunks for different messages may interleave freely
//! because every mutation is keyed by message id.
//!
//! # Framing
//!
//! - `begin` creates or resets the target message (`content = ""`, pending)
//!   and links it to its parent and retried sibling.
//! - `item` appends its fragment.
//! - `end` marks the message `success` and closes its stream.
//! - `error` marks the message `error`, keeps partial content and closes.
//!
//! A chunk for a message never seen before is treated as an implicit
//! `begin` without the reset. Chunks for a closed stream are dropped.
//!
//! # Cancellation
//!
//! Every open stream is tied to its own [`CancellationToken`]. Inside
//! [`StreamIngestor::consume`] each message token is a child of the
//! stream-wide token, so stopping one message leaves its interleaved
//! siblings streaming while cancelling the whole stream stops them all.
//! Stopping twice, or stopping a finished stream, changes nothing.

use crate::conversation::message::{Message, MessageStatus};
use crate::conversation::store::MessageStore;
use crate::error::{ChatError, Result};
use crate::streaming::chunk::{ChunkStream, ChunkType, StreamChunk};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Attributes stamped onto AI messages created from chunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    /// Session the messages belong to
    pub session_id: String,
    /// Display name for AI messages
    pub assistant_name: String,
    /// Provider answering, if a provider model is selected
    pub provider: Option<String>,
    /// Model answering, if a provider model is selected
    pub model: Option<String>,
    /// Agent answering, if an agent is selected
    pub agent_id: Option<String>,
    /// Workflow backing the session
    pub workflow_id: Option<String>,
    /// Parent for replies whose chunks do not name one
    pub reply_to: Option<String>,
    /// Retried message for replies whose chunks do not name one
    pub retry_of: Option<String>,
}

impl StreamContext {
    /// Context for `session_id` with the default assistant name
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            assistant_name: "AI".to_string(),
            ..Self::default()
        }
    }
}

/// What happened to a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Folded into its message
    Applied,
    /// Folded into a message created without a `begin`
    ImplicitBegin,
    /// Ignored because the message's stream is closed
    Dropped,
}

/// How a consumed stream finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The transport ended the stream
    Completed,
    /// A stop was requested
    Stopped,
    /// The transport reported a failure
    Failed(String),
    /// No chunk arrived within the idle timeout
    TimedOut,
}

/// Result of [`StreamIngestor::consume`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeSummary {
    /// AI messages touched by the stream, in first-seen order
    pub message_ids: Vec<String>,
    /// Number of chunks folded into messages
    pub applied: usize,
    /// Number of chunks ignored
    pub dropped: usize,
    /// Messages stopped on request, in stop order
    pub stopped: Vec<String>,
    /// How the stream finished
    pub outcome: StreamOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed(MessageStatus),
}

#[derive(Debug)]
struct StreamEntry {
    state: StreamState,
    token: CancellationToken,
}

/// Cancellation tokens of open streams, shared with [`Stopper`] handles
type TokenRegistry = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Clonable handle that requests stops from another task
///
/// A stop cancels the token of the targeted message's stream; the consumer
/// loop observes it, marks the message `stopped` and lets the transport know.
#[derive(Debug, Clone, Default)]
pub struct Stopper {
    tokens: TokenRegistry,
    signal: Arc<Notify>,
}

impl Stopper {
    /// Requests a stop of `message_id`
    ///
    /// # Returns
    ///
    /// Returns false when no open stream is registered for the message
    pub fn stop(&self, message_id: &str) -> bool {
        let token = match self.tokens.lock() {
            Ok(tokens) => tokens.get(message_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(message_id).cloned(),
        };
        match token {
            Some(token) if !token.is_cancelled() => {
                tracing::info!(message_id, "Stop requested");
                token.cancel();
                self.signal.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Returns true when `message_id` has an open stream
    pub fn is_streaming(&self, message_id: &str) -> bool {
        match self.tokens.lock() {
            Ok(tokens) => tokens.contains_key(message_id),
            Err(poisoned) => poisoned.into_inner().contains_key(message_id),
        }
    }
}

/// Reducer that applies chunks to a [`MessageStore`]
#[derive(Debug)]
pub struct StreamIngestor {
    context: StreamContext,
    streams: HashMap<String, StreamEntry>,
    tokens: TokenRegistry,
    stop_signal: Arc<Notify>,
}

impl StreamIngestor {
    /// Creates an ingestor stamping messages with `context`
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::{MessageStatus, MessageStore};
    /// use chatloom::streaming::{StreamChunk, StreamContext, StreamIngestor};
    ///
    /// let mut store = MessageStore::new();
    /// let mut ingestor = StreamIngestor::new(StreamContext::new("session-1"));
    /// ingestor.apply(&mut store, StreamChunk::begin("ai-1")).unwrap();
    /// ingestor.apply(&mut store, StreamChunk::item("ai-1", "Hi")).unwrap();
    /// ingestor.apply(&mut store, StreamChunk::end("ai-1")).unwrap();
    ///
    /// let msg = store.get("ai-1").unwrap();
    /// assert_eq!(msg.content, "Hi");
    /// assert_eq!(msg.status, MessageStatus::Success);
    /// ```
    pub fn new(context: StreamContext) -> Self {
        Self {
            context,
            streams: HashMap::new(),
            tokens: Arc::default(),
            stop_signal: Arc::default(),
        }
    }

    /// The attributes stamped onto new AI messages
    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    /// Replaces the attributes stamped onto new AI messages
    pub fn set_context(&mut self, context: StreamContext) {
        self.context = context;
    }

    /// A handle for stopping streams from another task
    pub fn stopper(&self) -> Stopper {
        Stopper {
            tokens: Arc::clone(&self.tokens),
            signal: Arc::clone(&self.stop_signal),
        }
    }

    /// Returns true while chunks for `message_id` are accepted
    pub fn is_open(&self, message_id: &str) -> bool {
        matches!(
            self.streams.get(message_id).map(|entry| entry.state),
            Some(StreamState::Open)
        )
    }

    /// Ids of messages whose stream is open
    pub fn open_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|(_, entry)| entry.state == StreamState::Open)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Cancellation token of an open stream
    ///
    /// Transports hold on to it to learn when to stop producing.
    pub fn cancellation_token(&self, message_id: &str) -> Option<CancellationToken> {
        self.streams
            .get(message_id)
            .filter(|entry| entry.state == StreamState::Open)
            .map(|entry| entry.token.clone())
    }

    /// Applies one chunk
    ///
    /// # Errors
    ///
    /// Only store errors are returned; a closed stream drops the chunk.
    pub fn apply(&mut self, store: &mut MessageStore, chunk: StreamChunk) -> Result<ChunkOutcome> {
        self.apply_with_token(store, chunk, None)
    }

    fn apply_with_token(
        &mut self,
        store: &mut MessageStore,
        chunk: StreamChunk,
        parent_token: Option<&CancellationToken>,
    ) -> Result<ChunkOutcome> {
        let message_id = chunk.message_id().to_string();

        let first_seen = match self.streams.get(&message_id).map(|entry| entry.state) {
            Some(StreamState::Closed(status)) => {
                tracing::debug!(
                    message_id = %message_id,
                    chunk_type = %chunk.chunk_type,
                    %status,
                    "Dropping chunk for closed stream"
                );
                return Ok(ChunkOutcome::Dropped);
            }
            Some(StreamState::Open) => false,
            None => true,
        };

        let mut outcome = ChunkOutcome::Applied;
        if chunk.chunk_type == ChunkType::Begin {
            store.upsert(self.message_from_chunk(&chunk));
        } else if first_seen {
            tracing::warn!(
                message_id = %message_id,
                chunk_type = %chunk.chunk_type,
                "Chunk arrived before begin; treating it as an implicit begin"
            );
            if !store.contains(&message_id) {
                store.upsert(self.message_from_chunk(&chunk));
            }
            outcome = ChunkOutcome::ImplicitBegin;
        }

        if first_seen {
            let token = parent_token
                .map(CancellationToken::child_token)
                .unwrap_or_else(CancellationToken::new);
            self.open(&message_id, token);
            confirm_parent(store, &message_id);
        }

        match chunk.chunk_type {
            ChunkType::Begin => {
                tracing::debug!(message_id = %message_id, "Stream began");
            }
            ChunkType::Item => {
                store.append_content(&message_id, &chunk.content)?;
            }
            ChunkType::End => {
                store.set_status(&message_id, MessageStatus::Success)?;
                self.close(&message_id, MessageStatus::Success);
                tracing::debug!(message_id = %message_id, "Stream ended");
            }
            ChunkType::Error => {
                let error = ChatError::Stream {
                    message_id: message_id.clone(),
                    reason: chunk.content.clone(),
                };
                tracing::warn!(error = %error, "Stream reported an error");
                store.set_status(&message_id, MessageStatus::Error)?;
                self.close(&message_id, MessageStatus::Error);
            }
        }

        Ok(outcome)
    }

    /// Stops the stream of `message_id`
    ///
    /// Marks the message `stopped`, keeps its content and cancels its token.
    ///
    /// # Returns
    ///
    /// Returns false, changing nothing, when the stream is unknown or
    /// already closed
    pub fn stop(&mut self, store: &mut MessageStore, message_id: &str) -> Result<bool> {
        self.terminate(store, message_id, MessageStatus::Stopped)
    }

    /// Marks an open stream as failed by the transport
    ///
    /// # Returns
    ///
    /// Returns false when the stream is unknown or already closed
    pub fn fail(&mut self, store: &mut MessageStore, message_id: &str, reason: &str) -> Result<bool> {
        let failed = self.terminate(store, message_id, MessageStatus::Error)?;
        if failed {
            let error = ChatError::Stream {
                message_id: message_id.to_string(),
                reason: reason.to_string(),
            };
            tracing::warn!(error = %error, "Stream failed");
        }
        Ok(failed)
    }

    fn terminate(&mut self, store: &mut MessageStore, message_id: &str, status: MessageStatus) -> Result<bool> {
        let Some(entry) = self.streams.get(message_id) else {
            return Ok(false);
        };
        if entry.state != StreamState::Open {
            return Ok(false);
        }
        entry.token.cancel();
        store.set_status(message_id, status)?;
        self.close(message_id, status);
        tracing::info!(message_id, %status, "Stream terminated");
        Ok(true)
    }

    /// Folds a transport stream into the store
    ///
    /// Runs until the stream ends, `cancel` fires, a transport error arrives
    /// or no chunk shows up within `idle_timeout`. Transport failures are
    /// recorded on the affected messages and reported in the summary; they
    /// are never returned as errors.
    ///
    /// A [`Stopper`] request stops only the targeted message; chunks for the
    /// other messages keep being folded. Once every message seen on the
    /// stream is closed and at least one was stopped, the stream is
    /// abandoned with [`StreamOutcome::Stopped`].
    ///
    /// # Errors
    ///
    /// Only store errors are returned.
    pub async fn consume(
        &mut self,
        store: &mut MessageStore,
        mut stream: ChunkStream,
        cancel: &CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Result<ConsumeSummary> {
        let mut summary = ConsumeSummary {
            message_ids: Vec::new(),
            applied: 0,
            dropped: 0,
            stopped: Vec::new(),
            outcome: StreamOutcome::Completed,
        };
        let stop_signal = Arc::clone(&self.stop_signal);

        loop {
            let next = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    summary.outcome = StreamOutcome::Stopped;
                    break;
                }

                _ = stop_signal.notified() => NextChunk::StopRequested,

                next = next_chunk(&mut stream, idle_timeout) => next,
            };

            let chunk = match next {
                NextChunk::Chunk(chunk) => chunk,
                NextChunk::StopRequested => {
                    let stopped = self.stop_cancelled(store, &summary.message_ids)?;
                    if stopped.is_empty() {
                        continue;
                    }
                    summary.stopped.extend(stopped);
                    if summary.message_ids.iter().all(|id| !self.is_open(id)) {
                        summary.outcome = StreamOutcome::Stopped;
                        break;
                    }
                    continue;
                }
                NextChunk::Ended => break,
                NextChunk::Failed(reason) => {
                    summary.outcome = StreamOutcome::Failed(reason);
                    break;
                }
                NextChunk::TimedOut => {
                    summary.outcome = StreamOutcome::TimedOut;
                    break;
                }
            };

            let message_id = chunk.message_id().to_string();
            if !summary.message_ids.contains(&message_id) {
                summary.message_ids.push(message_id);
            }
            match self.apply_with_token(store, chunk, Some(cancel))? {
                ChunkOutcome::Dropped => summary.dropped += 1,
                _ => summary.applied += 1,
            }
        }

        for message_id in &summary.message_ids {
            match &summary.outcome {
                StreamOutcome::Stopped => {
                    if self.stop(store, message_id)? {
                        summary.stopped.push(message_id.clone());
                    }
                }
                StreamOutcome::Failed(reason) => {
                    self.fail(store, message_id, reason)?;
                }
                StreamOutcome::TimedOut => {
                    self.fail(store, message_id, "no chunk received before idle timeout")?;
                }
                StreamOutcome::Completed => {
                    self.fail(store, message_id, "stream closed before end")?;
                }
            }
        }

        tracing::debug!(
            messages = summary.message_ids.len(),
            applied = summary.applied,
            dropped = summary.dropped,
            stopped = summary.stopped.len(),
            outcome = ?summary.outcome,
            "Stream consumed"
        );
        Ok(summary)
    }

    /// Stops the open messages among `message_ids` whose token was cancelled
    fn stop_cancelled(&mut self, store: &mut MessageStore, message_ids: &[String]) -> Result<Vec<String>> {
        let cancelled: Vec<String> = message_ids
            .iter()
            .filter(|id| {
                self.streams.get(id.as_str()).map_or(false, |entry| {
                    entry.state == StreamState::Open && entry.token.is_cancelled()
                })
            })
            .cloned()
            .collect();
        for message_id in &cancelled {
            self.stop(store, message_id)?;
        }
        Ok(cancelled)
    }

    fn message_from_chunk(&self, chunk: &StreamChunk) -> Message {
        let created_at = chunk_time(chunk.metadata.timestamp);
        let mut message = Message::ai(chunk.message_id(), self.context.session_id.as_str())
            .with_name(self.context.assistant_name.as_str())
            .with_created_at(created_at);
        message.provider = self.context.provider.clone();
        message.model = self.context.model.clone();
        message.agent_id = self.context.agent_id.clone();
        message.workflow_id = self.context.workflow_id.clone();
        message.execution_id = chunk.metadata.execution_id.clone();
        message.previous_message_id = chunk
            .metadata
            .previous_message_id
            .clone()
            .or_else(|| self.context.reply_to.clone());
        message.retry_of_message_id = chunk
            .metadata
            .retry_of_message_id
            .clone()
            .or_else(|| self.context.retry_of.clone());
        message
    }

    fn open(&mut self, message_id: &str, token: CancellationToken) {
        self.lock_tokens()
            .insert(message_id.to_string(), token.clone());
        self.streams.insert(
            message_id.to_string(),
            StreamEntry {
                state: StreamState::Open,
                token,
            },
        );
    }

    fn close(&mut self, message_id: &str, status: MessageStatus) {
        if let Some(entry) = self.streams.get_mut(message_id) {
            entry.state = StreamState::Closed(status);
        }
        self.lock_tokens().remove(message_id);
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

enum NextChunk {
    Chunk(StreamChunk),
    StopRequested,
    Ended,
    Failed(String),
    TimedOut,
}

async fn next_chunk(stream: &mut ChunkStream, idle_timeout: Option<Duration>) -> NextChunk {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return NextChunk::TimedOut,
        },
        None => stream.next().await,
    };
    match next {
        Some(Ok(chunk)) => NextChunk::Chunk(chunk),
        Some(Err(error)) => NextChunk::Failed(error.to_string()),
        None => NextChunk::Ended,
    }
}

/// The server accepted a pending human message once its reply starts
fn confirm_parent(store: &mut MessageStore, message_id: &str) {
    let Some(parent_id) = store
        .get(message_id)
        .and_then(|message| message.previous_message_id.clone())
    else {
        return;
    };
    let pending_human = store
        .get(&parent_id)
        .map_or(false, |parent| {
            parent.is_human() && parent.status == MessageStatus::Pending
        });
    if pending_human && store.set_status(&parent_id, MessageStatus::Success).is_ok() {
        tracing::debug!(message_id = %parent_id, "Human message confirmed");
    }
}

fn chunk_time(timestamp_ms: i64) -> DateTime<Utc> {
    if timestamp_ms <= 0 {
        return Utc::now();
    }
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Utc::now)
}
