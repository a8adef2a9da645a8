//! In-memory message store
//!
//! Holds the canonical set of messages for every session the client has
//! seen. Messages are never removed; streaming only ever appends content
//! or moves a message to a terminal status.

use crate::conversation::message::{Message, MessageStatus};
use crate::error::{ChatError, Result};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct StoredMessage {
    message: Message,
    /// Insertion sequence, used to break `created_at` ties
    seq: u64,
}

/// Canonical message set keyed by message id
///
/// # Examples
///
/// ```
/// use chatloom::conversation::{Message, MessageStore};
///
/// let mut store = MessageStore::new();
/// store.upsert(Message::ai("ai-1", "session-1"));
/// store.append_content("ai-1", "Hello").unwrap();
/// store.append_content("ai-1", ", world").unwrap();
/// assert_eq!(store.get("ai-1").unwrap().content, "Hello, world");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: HashMap<String, StoredMessage>,
    next_seq: u64,
}

impl MessageStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message or merges it into the stored one
    ///
    /// When the id is already known, optional fields only overwrite when the
    /// incoming value is `Some`; `content`, `status` and `updated_at` are
    /// always taken from the incoming message. `created_at` and insertion
    /// order of the first sighting are kept.
    ///
    /// # Returns
    ///
    /// Returns true when the message was newly inserted
    pub fn upsert(&mut self, incoming: Message) -> bool {
        match self.messages.get_mut(&incoming.id) {
            Some(stored) => {
                merge_into(&mut stored.message, incoming);
                false
            }
            None => {
                tracing::debug!(message_id = %incoming.id, session_id = %incoming.session_id, "Inserted message");
                let seq = self.next_seq;
                self.next_seq += 1;
                self.messages.insert(
                    incoming.id.clone(),
                    StoredMessage {
                        message: incoming,
                        seq,
                    },
                );
                true
            }
        }
    }

    /// Appends a streamed fragment to a message's content
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `message_id` is unknown
    pub fn append_content(&mut self, message_id: &str, fragment: &str) -> Result<()> {
        let stored = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        stored.message.content.push_str(fragment);
        stored.message.updated_at = Utc::now();
        Ok(())
    }

    /// Moves a message to a new status
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `message_id` is unknown
    pub fn set_status(&mut self, message_id: &str, status: MessageStatus) -> Result<()> {
        let stored = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        stored.message.status = status;
        stored.message.updated_at = Utc::now();
        Ok(())
    }

    /// Looks up a message by id
    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id).map(|stored| &stored.message)
    }

    /// Returns true when the store knows `message_id`
    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.contains_key(message_id)
    }

    /// All messages of a session
    ///
    /// Callers must not rely on the order; path ordering is the resolver's
    /// job. The returned vector happens to follow insertion order, which the
    /// resolver uses to break creation-time ties.
    pub fn get_all(&self, session_id: &str) -> Vec<&Message> {
        let mut entries: Vec<&StoredMessage> = self
            .messages
            .values()
            .filter(|stored| stored.message.session_id == session_id)
            .collect();
        entries.sort_by_key(|stored| stored.seq);
        entries.into_iter().map(|stored| &stored.message).collect()
    }

    /// Ids of the sessions that hold at least one message
    pub fn sessions(&self) -> BTreeSet<&str> {
        self.messages
            .values()
            .map(|stored| stored.message.session_id.as_str())
            .collect()
    }

    /// Number of stored messages across all sessions
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true when no messages are stored
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn merge_into(stored: &mut Message, incoming: Message) {
    stored.session_id = incoming.session_id;
    stored.message_type = incoming.message_type;
    stored.name = incoming.name;
    stored.content = incoming.content;
    stored.status = incoming.status;
    stored.updated_at = incoming.updated_at;

    merge_option(&mut stored.provider, incoming.provider);
    merge_option(&mut stored.model, incoming.model);
    merge_option(&mut stored.agent_id, incoming.agent_id);
    merge_option(&mut stored.workflow_id, incoming.workflow_id);
    merge_option(&mut stored.execution_id, incoming.execution_id);
    merge_option(&mut stored.previous_message_id, incoming.previous_message_id);
    merge_option(&mut stored.retry_of_message_id, incoming.retry_of_message_id);
    merge_option(
        &mut stored.revision_of_message_id,
        incoming.revision_of_message_id,
    );
}

fn merge_option(slot: &mut Option<String>, incoming: Option<String>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_upsert_inserts_new_message() {
        let mut store = MessageStore::new();
        assert!(store.upsert(Message::human("m1", "s1", "hi")));
        assert_eq!(store.len(), 1);
        assert!(store.contains("m1"));
    }

    #[test]
    fn test_upsert_merges_preferring_present_fields() {
        let mut store = MessageStore::new();
        let mut original = Message::ai("a1", "s1").with_previous("m1");
        original.model = Some("gpt-4".to_string());
        store.upsert(original.clone());

        let update = Message::ai("a1", "s1")
            .with_content("done")
            .with_status(MessageStatus::Success);
        assert!(!store.upsert(update));

        let merged = store.get("a1").unwrap();
        assert_eq!(merged.content, "done");
        assert_eq!(merged.status, MessageStatus::Success);
        assert_eq!(merged.model.as_deref(), Some("gpt-4"));
        assert_eq!(merged.previous_message_id.as_deref(), Some("m1"));
        assert_eq!(merged.created_at, original.created_at);
    }

    #[test]
    fn test_upsert_always_overwrites_content_even_when_empty() {
        let mut store = MessageStore::new();
        store.upsert(Message::ai("a1", "s1").with_content("partial"));
        store.upsert(Message::ai("a1", "s1"));
        assert_eq!(store.get("a1").unwrap().content, "");
    }

    #[test]
    fn test_upsert_keeps_first_created_at() {
        let mut store = MessageStore::new();
        let early = Utc::now() - Duration::minutes(5);
        store.upsert(Message::ai("a1", "s1").with_created_at(early));
        store.upsert(Message::ai("a1", "s1"));
        assert_eq!(store.get("a1").unwrap().created_at, early);
    }

    #[test]
    fn test_append_content_unknown_id_fails() {
        let mut store = MessageStore::new();
        let err = store.append_content("missing", "x").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatError>(),
            Some(ChatError::NotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_append_content_touches_updated_at() {
        let mut store = MessageStore::new();
        let early = Utc::now() - Duration::minutes(5);
        store.upsert(Message::ai("a1", "s1").with_created_at(early));
        store.append_content("a1", "x").unwrap();
        let msg = store.get("a1").unwrap();
        assert!(msg.updated_at > early);
        assert_eq!(msg.created_at, early);
    }

    #[test]
    fn test_get_all_filters_by_session() {
        let mut store = MessageStore::new();
        store.upsert(Message::human("m1", "s1", "a"));
        store.upsert(Message::human("m2", "s2", "b"));
        store.upsert(Message::ai("a1", "s1"));

        let ids: Vec<&str> = store.get_all("s1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "a1"]);
        assert_eq!(store.sessions().len(), 2);
        assert!(store.get_all("unknown").is_empty());
    }

    #[test]
    fn test_set_status_unknown_id_fails() {
        let mut store = MessageStore::new();
        assert!(store.set_status("nope", MessageStatus::Stopped).is_err());
    }
}
