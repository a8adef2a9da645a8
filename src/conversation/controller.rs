//! Chat controller
//!
//! [`ChatController`] owns the state of one session: its metadata, the
//! message store, navigation state and the stream ingestor. It turns user
//! intents (send, edit, regenerate, navigate, stop) into transport calls and
//! folds the resulting chunk streams into the store.
//!
//! Human messages are inserted optimistically as `pending` before the
//! transport is called; the first chunk of the reply confirms them. A call
//! that fails before any reply chunk arrives marks the human message `error`.

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conversation::message::{Message, MessageStatus};
use crate::conversation::resolver::{Direction, GroupKey, Navigation, RevisionGraph};
use crate::conversation::session::{title_from_prompt, ModelSelection, Session};
use crate::conversation::store::MessageStore;
use crate::error::{ChatError, Result};
use crate::streaming::{ChunkStream, ConsumeSummary, Stopper, StreamContext, StreamIngestor};
use crate::transport::{
    ChatTransport, EditMessageRequest, ModelCatalog, RegenerateRequest, SendMessageRequest,
};

/// Owned snapshot of one active path entry, for the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathView {
    /// The displayed message
    pub message: Message,
    /// Zero-based depth
    pub depth: usize,
    /// One-based position within its alternative group
    pub position: usize,
    /// Size of its alternative group
    pub total: usize,
}

impl PathView {
    /// Counter such as `2/2`
    pub fn counter(&self) -> String {
        format!("{}/{}", self.position, self.total)
    }

    /// Returns true when previous/next controls apply
    pub fn has_alternatives(&self) -> bool {
        self.total > 1
    }
}

/// Drives one chat session against a [`ChatTransport`]
///
/// # Examples
///
/// ```
/// use chatloom::config::Config;
/// use chatloom::conversation::ChatController;
/// use chatloom::streaming::StreamChunk;
/// use chatloom::transport::{ScriptedReply, ScriptedTransport};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = ScriptedTransport::new();
/// transport
///     .push_reply(ScriptedReply::chunks(vec![
///         StreamChunk::begin("ai-1"),
///         StreamChunk::item("ai-1", "Hello! How can I help?"),
///         StreamChunk::end("ai-1"),
///     ]))
///     .await;
///
/// let mut chat = ChatController::new("session-1", transport, Config::default());
/// chat.submit("Hello, AI!").await?;
///
/// let path = chat.active_path()?;
/// assert_eq!(path.len(), 2);
/// assert_eq!(path[1].message.content, "Hello! How can I help?");
/// # Ok(())
/// # }
/// ```
pub struct ChatController<T> {
    transport: T,
    config: Config,
    session_id: String,
    session: Option<Session>,
    selected_model: Option<ModelSelection>,
    models: Option<ModelCatalog>,
    store: MessageStore,
    navigation: Navigation,
    ingestor: StreamIngestor,
}

impl<T: ChatTransport> ChatController<T> {
    /// Creates a controller for `session_id`
    ///
    /// The session itself is created on the first `submit`, or fetched by
    /// [`ChatController::load`].
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session the controller drives
    /// * `transport` - Chat API implementation
    /// * `config` - Naming, titling and stream settings
    pub fn new(session_id: impl Into<String>, transport: T, config: Config) -> Self {
        let session_id = session_id.into();
        let mut context = StreamContext::new(session_id.as_str());
        context.assistant_name = config.chat.assistant_name.clone();
        Self {
            transport,
            config,
            session_id,
            session: None,
            selected_model: None,
            models: None,
            store: MessageStore::new(),
            navigation: Navigation::new(),
            ingestor: StreamIngestor::new(context),
        }
    }

    /// The session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session metadata, once created or loaded
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The message store
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Model used for the next request
    pub fn selected_model(&self) -> Option<&ModelSelection> {
        self.selected_model.as_ref()
    }

    /// The catalog fetched by [`ChatController::fetch_models`]
    pub fn models(&self) -> Option<&ModelCatalog> {
        self.models.as_ref()
    }

    /// A handle for stopping in-flight replies
    ///
    /// Sending, editing and regenerating hold the controller until the reply
    /// stream is done, so stops are requested through this handle from
    /// another task. A stopped message keeps the content received so far,
    /// other replies on the same stream keep streaming, and the transport is
    /// told through `stop_generation` before the request returns. Stopping a
    /// finished or unknown message returns false and changes nothing.
    pub fn stopper(&self) -> Stopper {
        self.ingestor.stopper()
    }

    /// Loads the session and its messages from the transport
    ///
    /// Messages are merged into the store; messages of other sessions are
    /// skipped.
    ///
    /// # Returns
    ///
    /// Returns the number of messages merged
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or hands back another session
    pub async fn load(&mut self) -> Result<usize> {
        let snapshot = self.transport.fetch_conversation(&self.session_id).await?;
        if snapshot.session.id != self.session_id {
            return Err(ChatError::Transport(format!(
                "requested session {} but received {}",
                self.session_id, snapshot.session.id
            ))
            .into());
        }

        let mut merged = 0;
        for message in snapshot.messages {
            if message.session_id != self.session_id {
                tracing::warn!(
                    message_id = %message.id,
                    session_id = %message.session_id,
                    "Skipping message of another session"
                );
                continue;
            }
            self.store.upsert(message);
            merged += 1;
        }

        if let Some(model) = snapshot.session.model.clone() {
            self.selected_model = Some(model);
        }
        self.session = Some(snapshot.session);
        self.refresh_context();
        tracing::info!(session_id = %self.session_id, messages = merged, "Conversation loaded");
        Ok(merged)
    }

    /// Fetches and caches the model catalog
    ///
    /// Later calls to [`ChatController::select_model`] are checked against it.
    pub async fn fetch_models(&mut self) -> Result<&ModelCatalog> {
        let catalog = self.transport.fetch_models().await?;
        Ok(&*self.models.insert(catalog))
    }

    /// Chooses the model for subsequent requests
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::UnknownModel`] when a catalog is loaded and does
    /// not offer `selection`
    pub fn select_model(&mut self, selection: ModelSelection) -> Result<()> {
        if let Some(models) = &self.models {
            if !models.contains(&selection) {
                return Err(ChatError::UnknownModel(selection.to_string()).into());
            }
        }
        tracing::info!(session_id = %self.session_id, model = %selection, "Model selected");
        if let Some(session) = self.session.as_mut() {
            session.set_model(selection.clone());
        }
        self.selected_model = Some(selection);
        self.refresh_context();
        Ok(())
    }

    /// Renames the session
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidOperation`] for a blank title or before the
    /// session exists
    pub fn rename(&mut self, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::InvalidOperation("title cannot be empty".to_string()).into());
        }
        let session = self.session.as_mut().ok_or_else(|| {
            ChatError::InvalidOperation("session has not been started".to_string())
        })?;
        session.rename(title);
        tracing::info!(session_id = %self.session_id, title, "Session renamed");
        Ok(())
    }

    /// Snapshot of the active path, root first
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::CycleDetected`] if the stored messages loop
    pub fn active_path(&self) -> Result<Vec<PathView>> {
        let graph = RevisionGraph::build(self.store.get_all(&self.session_id))?;
        let path = graph.active_path(None, &self.navigation)?;
        Ok(path
            .entries()
            .iter()
            .map(|entry| PathView {
                message: entry.message.clone(),
                depth: entry.depth,
                position: entry.position,
                total: entry.total,
            })
            .collect())
    }

    /// Sends a new human message after the last message on the active path
    ///
    /// # Returns
    ///
    /// Returns how the reply stream finished
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidOperation`] for blank content and the
    /// transport error if the call is rejected
    pub async fn submit(&mut self, content: &str) -> Result<ConsumeSummary> {
        if content.trim().is_empty() {
            return Err(
                ChatError::InvalidOperation("message content cannot be empty".to_string()).into(),
            );
        }

        let previous = self.tail_id()?;
        self.ensure_session(content);

        let message_id = new_id();
        let mut message = Message::human(&message_id, &self.session_id, content)
            .with_name(self.config.chat.user_name.as_str());
        if let Some(previous) = &previous {
            message = message.with_previous(previous.as_str());
        }
        self.insert_human(message);
        tracing::info!(session_id = %self.session_id, message_id = %message_id, "Sending message");

        let request = SendMessageRequest {
            session_id: self.session_id.clone(),
            message_id: message_id.clone(),
            message: content.to_string(),
            previous_message_id: previous,
            model: self.selected_model.clone(),
        };
        self.expect_reply(Some(message_id.as_str()), None);
        let stream = self.transport.send_message(request).await;
        self.follow(stream, Some(message_id.as_str())).await
    }

    /// Replaces a human message with a revision and streams the new reply
    ///
    /// The original stays reachable as an alternative of the revision.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] for an unknown id and
    /// [`ChatError::InvalidOperation`] for AI messages or blank content
    pub async fn edit(&mut self, message_id: &str, content: &str) -> Result<ConsumeSummary> {
        let original = self.message(message_id)?.clone();
        if !original.is_human() {
            return Err(ChatError::InvalidOperation(format!(
                "only human messages can be edited: {}",
                message_id
            ))
            .into());
        }
        if content.trim().is_empty() {
            return Err(
                ChatError::InvalidOperation("message content cannot be empty".to_string()).into(),
            );
        }

        let key = self.group_of(message_id)?;
        self.navigation.follow_latest(&key);

        let revision_id = new_id();
        let mut revision = Message::human(&revision_id, &self.session_id, content)
            .with_name(self.config.chat.user_name.as_str())
            .with_revision_of(message_id);
        if let Some(previous) = &original.previous_message_id {
            revision = revision.with_previous(previous.as_str());
        }
        self.insert_human(revision);
        tracing::info!(
            session_id = %self.session_id,
            edited = message_id,
            revision = %revision_id,
            "Editing message"
        );

        let request = EditMessageRequest {
            session_id: self.session_id.clone(),
            edit_id: message_id.to_string(),
            message_id: revision_id.clone(),
            message: content.to_string(),
            model: self.selected_model.clone(),
        };
        self.expect_reply(Some(revision_id.as_str()), None);
        let stream = self.transport.edit_message(request).await;
        self.follow(stream, Some(revision_id.as_str())).await
    }

    /// Streams an alternative for an AI message
    ///
    /// The new reply becomes the active member of the group.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] for an unknown id and
    /// [`ChatError::InvalidOperation`] for human messages
    pub async fn regenerate(&mut self, message_id: &str) -> Result<ConsumeSummary> {
        let original = self.message(message_id)?.clone();
        if original.is_human() {
            return Err(ChatError::InvalidOperation(format!(
                "only AI messages can be regenerated: {}",
                message_id
            ))
            .into());
        }

        let key = self.group_of(message_id)?;
        self.navigation.follow_latest(&key);
        tracing::info!(session_id = %self.session_id, message_id, "Regenerating message");

        let request = RegenerateRequest {
            session_id: self.session_id.clone(),
            retry_id: message_id.to_string(),
            previous_message_id: original.previous_message_id.clone(),
            model: self.selected_model.clone(),
        };
        self.expect_reply(original.previous_message_id.as_deref(), Some(message_id));
        let stream = self.transport.regenerate_message(request).await;
        self.follow(stream, None).await
    }

    /// Shows the previous or next alternative at `message_id`'s depth
    ///
    /// # Returns
    ///
    /// Returns false when there is no alternative in that direction
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `message_id` is not on the active path
    pub fn navigate(&mut self, message_id: &str, direction: Direction) -> Result<bool> {
        let graph = RevisionGraph::build(self.store.get_all(&self.session_id))?;
        let path = graph.active_path(None, &self.navigation)?;
        self.navigation.step(&path, message_id, direction)
    }

    /// Folds a reply stream into the store
    async fn follow(
        &mut self,
        stream: Result<ChunkStream>,
        human_id: Option<&str>,
    ) -> Result<ConsumeSummary> {
        let stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(session_id = %self.session_id, error = %error, "Request rejected");
                if let Some(human_id) = human_id {
                    self.store.set_status(human_id, MessageStatus::Error)?;
                }
                return Err(error);
            }
        };

        let cancel = CancellationToken::new();
        let idle_timeout = self.config.stream.idle_timeout();
        let summary = self
            .ingestor
            .consume(&mut self.store, stream, &cancel, idle_timeout)
            .await?;

        if let Some(human_id) = human_id {
            let unconfirmed = self
                .store
                .get(human_id)
                .map_or(false, |message| message.status == MessageStatus::Pending);
            if unconfirmed {
                tracing::warn!(message_id = human_id, "No reply arrived for message");
                self.store.set_status(human_id, MessageStatus::Error)?;
            }
        }

        for message_id in &summary.stopped {
            if let Err(error) = self
                .transport
                .stop_generation(&self.session_id, message_id)
                .await
            {
                tracing::warn!(message_id = %message_id, error = %error, "Stop notification failed");
            }
        }

        if !summary.message_ids.is_empty() {
            if let Some(session) = self.session.as_mut() {
                session.touch_message(Utc::now());
            }
        }
        Ok(summary)
    }

    /// Tells the ingestor where replies to the next request belong
    fn expect_reply(&mut self, reply_to: Option<&str>, retry_of: Option<&str>) {
        let mut context = self.ingestor.context().clone();
        context.reply_to = reply_to.map(str::to_string);
        context.retry_of = retry_of.map(str::to_string);
        self.ingestor.set_context(context);
    }

    fn insert_human(&mut self, message: Message) {
        if let Some(session) = self.session.as_mut() {
            session.touch_message(message.created_at);
        }
        self.store.upsert(message);
    }

    fn ensure_session(&mut self, first_message: &str) {
        if self.session.is_some() {
            return;
        }
        let title = title_from_prompt(
            first_message,
            self.config.chat.title_max_length,
            &self.config.chat.default_title,
        );
        let mut session = Session::new(self.session_id.as_str(), title);
        session.model = self.selected_model.clone();
        tracing::info!(session_id = %self.session_id, title = %session.title, "Session created");
        self.session = Some(session);
        self.refresh_context();
    }

    fn refresh_context(&mut self) {
        let mut context = StreamContext::new(self.session_id.as_str());
        context.assistant_name = self.config.chat.assistant_name.clone();
        match &self.selected_model {
            Some(ModelSelection::Provider { provider, model }) => {
                context.provider = Some(provider.clone());
                context.model = Some(model.clone());
            }
            Some(ModelSelection::Agent { agent_id }) => {
                context.agent_id = Some(agent_id.clone());
            }
            None => {}
        }
        context.workflow_id = self
            .session
            .as_ref()
            .and_then(|session| session.workflow_id.clone());
        self.ingestor.set_context(context);
    }

    fn message(&self, message_id: &str) -> Result<&Message> {
        self.store
            .get(message_id)
            .filter(|message| message.session_id == self.session_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()).into())
    }

    fn group_of(&self, message_id: &str) -> Result<GroupKey> {
        let graph = RevisionGraph::build(self.store.get_all(&self.session_id))?;
        graph
            .alternatives(message_id)
            .map(|group| group.key().clone())
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()).into())
    }

    fn tail_id(&self) -> Result<Option<String>> {
        Ok(self
            .active_path()?
            .last()
            .map(|view| view.message.id.clone()))
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
