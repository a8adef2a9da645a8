//! Chat session metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which model answers in a session
///
/// A session either talks to a provider model directly or to a configured
/// agent that wraps one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ModelSelection {
    /// A provider model, e.g. `openai` / `gpt-4`
    #[serde(rename_all = "camelCase")]
    Provider {
        /// Provider name
        provider: String,
        /// Model name within the provider
        model: String,
    },
    /// A custom agent
    #[serde(rename_all = "camelCase")]
    Agent {
        /// Agent identifier
        agent_id: String,
    },
}

impl ModelSelection {
    /// Convenience constructor for a provider model
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::ModelSelection;
    ///
    /// let selection = ModelSelection::provider("openai", "gpt-4");
    /// assert_eq!(selection.to_string(), "openai/gpt-4");
    /// ```
    pub fn provider(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Convenience constructor for an agent
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self::Agent {
            agent_id: agent_id.into(),
        }
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider { provider, model } => write!(f, "{}/{}", provider, model),
            Self::Agent { agent_id } => write!(f, "agent:{}", agent_id),
        }
    }
}

/// Metadata of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session identifier
    pub id: String,
    /// User-facing title
    pub title: String,
    /// Owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Model answering in this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    /// Workflow backing the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last metadata change
    pub updated_at: DateTime<Utc>,
    /// Time of the most recent message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session with the given title
    ///
    /// # Examples
    ///
    /// ```
    /// use chatloom::conversation::Session;
    ///
    /// let session = Session::new("session-1", "New Chat");
    /// assert_eq!(session.title, "New Chat");
    /// assert!(session.last_message_at.is_none());
    /// ```
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            owner_id: None,
            model: None,
            workflow_id: None,
            created_at: now,
            updated_at: now,
            last_message_at: None,
        }
    }

    /// Renames the session
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Switches the answering model
    pub fn set_model(&mut self, model: ModelSelection) {
        self.model = Some(model);
        self.updated_at = Utc::now();
    }

    /// Records that a message was added at `at`
    pub fn touch_message(&mut self, at: DateTime<Utc>) {
        if self.last_message_at.map_or(true, |last| at > last) {
            self.last_message_at = Some(at);
        }
    }
}

/// Derives a session title from the first message
///
/// Whitespace is trimmed and titles longer than `max_len` characters are cut
/// and suffixed with `...`. Falls back to `fallback` for blank input.
///
/// # Examples
///
/// ```
/// use chatloom::conversation::session::title_from_prompt;
///
/// assert_eq!(title_from_prompt("  Hello, AI!  ", 50, "New Chat"), "Hello, AI!");
/// assert_eq!(title_from_prompt("abcdefghij", 8, "New Chat"), "abcde...");
/// assert_eq!(title_from_prompt("   ", 50, "New Chat"), "New Chat");
/// ```
pub fn title_from_prompt(prompt: &str, max_len: usize, fallback: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut title: String = trimmed.chars().take(keep).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_touch_message_only_moves_forward() {
        let mut session = Session::new("s1", "t");
        let now = Utc::now();
        session.touch_message(now);
        session.touch_message(now - Duration::seconds(10));
        assert_eq!(session.last_message_at, Some(now));
    }

    #[test]
    fn test_set_model_updates_timestamp() {
        let mut session = Session::new("s1", "t");
        let before = session.updated_at;
        session.set_model(ModelSelection::agent("agent-7"));
        assert_eq!(session.model, Some(ModelSelection::agent("agent-7")));
        assert!(session.updated_at >= before);
    }

    #[test]
    fn test_title_truncation_is_char_safe() {
        let title = title_from_prompt("ééééééééééé", 6, "New Chat");
        assert_eq!(title, "ééé...");
    }

    #[test]
    fn test_model_selection_serialization() {
        let json = serde_json::to_value(ModelSelection::provider("anthropic", "claude"))
            .expect("serialize");
        assert_eq!(json["kind"], "provider");
        assert_eq!(json["model"], "claude");

        let agent: ModelSelection =
            serde_json::from_str(r#"{"kind":"agent","agentId":"a-1"}"#).expect("parse");
        assert_eq!(agent, ModelSelection::agent("a-1"));
    }
}
