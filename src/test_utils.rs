//! Test utilities for Chatloom
//!
//! Helpers for building timestamps, scripted replies and fixture files in
//! unit tests.

use crate::conversation::Message;
use crate::error::ChatError;
use crate::streaming::StreamChunk;
use crate::transport::ScriptedReply;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::PathBuf;
use tempfile::TempDir;

/// A fixed instant `seconds` after 2025-01-01T00:00:00Z
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base timestamp")
        + Duration::seconds(seconds)
}

/// A complete reply streaming `parts` into message `id`
///
/// # Examples
///
/// ```ignore
/// let reply = scripted_reply("ai-1", &["Hel", "lo"]);
/// assert_eq!(reply.chunks.len(), 4);
/// ```
pub fn scripted_reply(id: &str, parts: &[&str]) -> ScriptedReply {
    let mut chunks = vec![StreamChunk::begin(id)];
    chunks.extend(parts.iter().map(|part| StreamChunk::item(id, *part)));
    chunks.push(StreamChunk::end(id));
    ScriptedReply::chunks(chunks)
}

/// Human `msg-1` answered by AI `msg-2`, both finished
pub fn greeting(session_id: &str) -> Vec<Message> {
    vec![
        Message::human("msg-1", session_id, "Hello, AI!")
            .with_status(crate::conversation::MessageStatus::Success)
            .with_created_at(at(0)),
        Message::ai("msg-2", session_id)
            .with_previous("msg-1")
            .with_content("Hello! How can I help?")
            .with_status(crate::conversation::MessageStatus::Success)
            .with_created_at(at(1)),
    ]
}

/// Writes `contents` to `name` inside a fresh temporary directory
///
/// # Panics
///
/// Panics if the directory or file cannot be created
pub fn temp_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    (dir, path)
}

/// Assert that an error is a [`ChatError`] whose message contains `expected`
///
/// # Panics
///
/// Panics if the result is Ok, the error is not a `ChatError`, or the
/// message does not contain `expected`
pub fn assert_chat_error_contains<T: std::fmt::Debug>(result: crate::Result<T>, expected: &str) {
    let error = result.expect_err("expected an error");
    let chat_error = error
        .downcast_ref::<ChatError>()
        .unwrap_or_else(|| panic!("expected ChatError, got {:?}", error));
    let message = chat_error.to_string();
    assert!(
        message.contains(expected),
        "Expected error to contain '{}', but got '{}'",
        expected,
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_is_monotonic() {
        assert!(at(1) > at(0));
        assert_eq!(at(60) - at(0), Duration::minutes(1));
    }

    #[test]
    fn test_scripted_reply_frames_parts() {
        let reply = scripted_reply("ai-1", &["Hel", "lo"]);
        assert_eq!(reply.chunks.len(), 4);
        assert_eq!(reply.chunks[2].content, "lo");
        assert!(!reply.hold_open);
    }

    #[test]
    fn test_temp_file_writes_contents() {
        let (_dir, path) = temp_file("fixture.yaml", "actions: []\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "actions: []\n");
    }

    #[test]
    fn test_assert_chat_error_contains() {
        let result: crate::Result<()> = Err(ChatError::NotFound("msg-9".to_string()).into());
        assert_chat_error_contains(result, "msg-9");
    }
}
