//! Conversation fixtures
//!
//! A fixture is a YAML file describing a scripted conversation: the session,
//! seed messages already on the server, queued replies for the scripted
//! transport, an optional model catalog and the user actions to perform.
//!
//! ```yaml
//! session:
//!   id: session-1
//! replies:
//!   - chunks:
//!       - { type: begin, metadata: { messageId: ai-message-123 } }
//!       - { type: item, content: "Hello! How can I help?", metadata: { messageId: ai-message-123 } }
//!       - { type: end, metadata: { messageId: ai-message-123 } }
//! actions:
//!   - send: "Hello, AI!"
//! ```
//!
//! Actions that target a message take either its id or its depth on the
//! active path at the time the action runs (`0` is the first message).

use crate::conversation::{Message, ModelSelection};
use crate::error::{ChatError, Result};
use crate::transport::{ModelCatalog, ScriptedReply};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A scripted conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    /// Session the actions run in
    #[serde(default)]
    pub session: FixtureSession,
    /// Messages the server already holds
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Replies handed out to generating calls, in order
    #[serde(default)]
    pub replies: Vec<ScriptedReply>,
    /// Models offered by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelCatalog>,
    /// User actions, performed in order
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Session settings of a fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureSession {
    /// Session id
    #[serde(default = "default_session_id")]
    pub id: String,
    /// Title of a session the server already holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Model selected when the session starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    /// Workflow backing the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

fn default_session_id() -> String {
    "session-1".to_string()
}

impl Default for FixtureSession {
    fn default() -> Self {
        Self {
            id: default_session_id(),
            title: None,
            model: None,
            workflow_id: None,
        }
    }
}

/// A message addressed by id or by depth on the active path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageRef {
    /// Zero-based depth on the active path
    Depth(usize),
    /// Message id
    Id(String),
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Depth(depth) => write!(f, "depth {}", depth),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// One user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Send a new message
    Send(String),
    /// Edit a human message
    Edit {
        /// The message to edit
        message: MessageRef,
        /// The new text
        content: String,
    },
    /// Regenerate an AI message
    Regenerate(MessageRef),
    /// Show the previous alternative
    Previous(MessageRef),
    /// Show the next alternative
    Next(MessageRef),
    /// Stop a reply
    ///
    /// A stop right after a generating action fires as soon as the named
    /// reply starts streaming. Anywhere else nothing is streaming, so it
    /// only checks that the message exists.
    Stop(MessageRef),
    /// Switch models
    SelectModel(ModelSelection),
    /// Rename the session
    Rename(String),
}

impl Action {
    /// Returns true for actions that stream a reply
    pub fn is_generating(&self) -> bool {
        matches!(
            self,
            Self::Send(_) | Self::Edit { .. } | Self::Regenerate(_)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(content) => write!(f, "send {:?}", content),
            Self::Edit { message, content } => write!(f, "edit {} -> {:?}", message, content),
            Self::Regenerate(target) => write!(f, "regenerate {}", target),
            Self::Previous(target) => write!(f, "previous at {}", target),
            Self::Next(target) => write!(f, "next at {}", target),
            Self::Stop(target) => write!(f, "stop {}", target),
            Self::SelectModel(selection) => write!(f, "select model {}", selection),
            Self::Rename(title) => write!(f, "rename {:?}", title),
        }
    }
}

impl Fixture {
    /// Reads a fixture from a YAML file
    ///
    /// # Arguments
    ///
    /// * `path` - Fixture file path
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Fixture`] if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Fixture(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses a fixture from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Fixture`] if the text is not a valid fixture
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::commands::fixture::{Action, Fixture};
    ///
    /// let fixture = Fixture::from_yaml("actions:\n  - send: hi\n  - previous: 1\n").unwrap();
    /// assert_eq!(fixture.session.id, "session-1");
    /// assert_eq!(fixture.actions[0], Action::Send("hi".to_string()));
    /// ```
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ChatError::Fixture(format!("Failed to parse fixture: {}", e)).into())
    }

    /// Seed messages that belong to another session
    pub fn foreign_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(move |message| message.session_id != self.session.id)
    }
}
