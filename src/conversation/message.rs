//! Chat message types
//!
//! Messages are the nodes of a conversation's revision graph. They link to
//! the message they reply to through `previous_message_id` and may mark
//! themselves as a retry or an edit of a sibling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Typed by the user
    Human,
    /// Generated by a model, agent or workflow
    Ai,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// Lifecycle status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created but not yet confirmed or still streaming
    #[default]
    Pending,
    /// Finished normally
    Success,
    /// The transport failed; partial content is kept
    Error,
    /// Stopped on user request; partial content is kept
    Stopped,
}

impl MessageStatus {
    /// Returns true once the message can no longer change by streaming
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::MessageStatus;
    ///
    /// assert!(!MessageStatus::Pending.is_final());
    /// assert!(MessageStatus::Stopped.is_final());
    /// ```
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// A single chat message
///
/// Serialized in camelCase to match the chat API payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier within the session
    pub id: String,
    /// Session this message belongs to
    pub session_id: String,
    /// Author kind
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Display name of the author
    pub name: String,
    /// Message text; grows by appends while streaming
    #[serde(default)]
    pub content: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: MessageStatus,
    /// LLM provider that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Agent that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Workflow backing the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Workflow execution that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// The message this one replies to
    #[serde(default)]
    pub previous_message_id: Option<String>,
    /// The AI message this one regenerates
    #[serde(default)]
    pub retry_of_message_id: Option<String>,
    /// The human message this one edits
    #[serde(default)]
    pub revision_of_message_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Creates a pending human message
    ///
    /// # Arguments
    ///
    /// * `id` - Message identifier
    /// * `session_id` - Owning session
    /// * `content` - The text the user typed
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::{Message, MessageStatus, MessageType};
    ///
    /// let msg = Message::human("msg-1", "session-1", "Hello, AI!");
    /// assert_eq!(msg.message_type, MessageType::Human);
    /// assert_eq!(msg.status, MessageStatus::Pending);
    /// assert!(msg.previous_message_id.is_none());
    /// ```
    pub fn human(
        id: impl Into<String>,
        session_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, session_id, MessageType::Human, "User", content)
    }

    /// Creates an empty, pending AI message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::{Message, MessageType};
    ///
    /// let msg = Message::ai("ai-1", "session-1");
    /// assert_eq!(msg.message_type, MessageType::Ai);
    /// assert!(msg.content.is_empty());
    /// ```
    pub fn ai(id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(id, session_id, MessageType::Ai, "AI", String::new())
    }

    fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        message_type: MessageType,
        name: &str,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            message_type,
            name: name.to_string(),
            content: content.into(),
            status: MessageStatus::Pending,
            provider: None,
            model: None,
            agent_id: None,
            workflow_id: None,
            execution_id: None,
            previous_message_id: None,
            retry_of_message_id: None,
            revision_of_message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the message this one replies to
    pub fn with_previous(mut self, previous_message_id: impl Into<String>) -> Self {
        self.previous_message_id = Some(previous_message_id.into());
        self
    }

    /// Marks this message as a regeneration of another AI message
    pub fn with_retry_of(mut self, retry_of_message_id: impl Into<String>) -> Self {
        self.retry_of_message_id = Some(retry_of_message_id.into());
        self
    }

    /// Marks this message as an edit of another human message
    pub fn with_revision_of(mut self, revision_of_message_id: impl Into<String>) -> Self {
        self.revision_of_message_id = Some(revision_of_message_id.into());
        self
    }

    /// Sets the author display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Sets the status
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets both timestamps
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// The sibling this message replaces, if it is a retry or an edit
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::Message;
    ///
    /// let retry = Message::ai("msg-2-retry", "s").with_retry_of("msg-2");
    /// assert_eq!(retry.replaces(), Some("msg-2"));
    /// ```
    pub fn replaces(&self) -> Option<&str> {
        self.retry_of_message_id
            .as_deref()
            .or(self.revision_of_message_id.as_deref())
    }

    /// Returns true for human messages
    pub fn is_human(&self) -> bool {
        self.message_type == MessageType::Human
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_message_defaults() {
        let msg = Message::human("m1", "s1", "hi");
        assert_eq!(msg.name, "User");
        assert_eq!(msg.content, "hi");
        assert!(msg.is_human());
        assert_eq!(msg.created_at, msg.updated_at);
    }

    #[test]
    fn test_ai_message_defaults() {
        let msg = Message::ai("a1", "s1");
        assert_eq!(msg.name, "AI");
        assert_eq!(msg.status, MessageStatus::Pending);
        assert!(!msg.is_human());
    }

    #[test]
    fn test_replaces_prefers_retry_link() {
        let msg = Message::ai("a2", "s1")
            .with_retry_of("a1")
            .with_revision_of("h1");
        assert_eq!(msg.replaces(), Some("a1"));
    }

    #[test]
    fn test_status_display_and_finality() {
        assert_eq!(MessageStatus::Success.to_string(), "success");
        assert!(MessageStatus::Error.is_final());
        assert!(!MessageStatus::default().is_final());
    }

    #[test]
    fn test_message_deserializes_from_api_shape() {
        let json = r#"{
            "id": "msg-2-retry",
            "sessionId": "session-1",
            "type": "ai",
            "name": "AI",
            "content": "Second response about AI (regenerated)",
            "status": "success",
            "provider": "openai",
            "model": "gpt-4",
            "previousMessageId": "msg-1",
            "retryOfMessageId": "msg-2",
            "revisionOfMessageId": null,
            "createdAt": "2025-01-01T00:00:02Z",
            "updatedAt": "2025-01-01T00:00:02Z"
        }"#;
        let msg: Message = serde_json::from_str(json).expect("parse message");
        assert_eq!(msg.message_type, MessageType::Ai);
        assert_eq!(msg.status, MessageStatus::Success);
        assert_eq!(msg.previous_message_id.as_deref(), Some("msg-1"));
        assert_eq!(msg.retry_of_message_id.as_deref(), Some("msg-2"));
        assert!(msg.revision_of_message_id.is_none());
    }

    #[test]
    fn test_message_serializes_type_field() {
        let msg = Message::human("m1", "s1", "hi");
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["type"], "human");
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["status"], "pending");
        assert!(value.get("provider").is_none());
    }
}
