//! Integration tests for end-to-end chat flows
//!
//! Drives the controller through the scripted transport and checks what
//! the rendering layer would show after sending, regenerating, editing,
//! navigating and stopping.

mod common;

use chatloom::conversation::{Direction, MessageStatus, MessageType};
use chatloom::streaming::StreamChunk;
use chatloom::transport::{ScriptedReply, TransportCall};
use std::time::Duration;

#[tokio::test]
async fn test_hello_ai_conversation() {
    let (mut chat, transport) = common::chat("session-1");
    transport
        .push_reply(common::reply(
            "ai-message-123",
            &["Hello! ", "How can I help?"],
        ))
        .await;

    let summary = tokio_test::assert_ok!(chat.submit("Hello, AI!").await);
    assert_eq!(summary.message_ids, vec!["ai-message-123".to_string()]);

    let path = chat.active_path().expect("path resolves");
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].message.message_type, MessageType::Human);
    assert_eq!(path[0].message.content, "Hello, AI!");
    assert_eq!(path[0].message.status, MessageStatus::Success);
    assert_eq!(path[1].message.message_type, MessageType::Ai);
    assert_eq!(path[1].message.id, "ai-message-123");
    assert_eq!(path[1].message.content, "Hello! How can I help?");
    assert_eq!(path[1].message.status, MessageStatus::Success);
    assert_eq!(
        path[1].message.previous_message_id.as_deref(),
        Some(path[0].message.id.as_str())
    );
    assert!(!path[1].has_alternatives());
}

#[tokio::test]
async fn test_regenerate_then_navigate_back() {
    let (mut chat, transport) = common::chat("session-1");
    transport.push_reply(common::reply("msg-2", &["First take"])).await;
    chat.submit("Tell me about AI").await.unwrap();
    let human_id = chat.active_path().unwrap()[0].message.id.clone();

    transport
        .push_reply(ScriptedReply::chunks(vec![
            StreamChunk::begin("msg-2-retry")
                .with_previous(human_id.as_str())
                .with_retry_of("msg-2"),
            StreamChunk::item("msg-2-retry", "Second take"),
            StreamChunk::end("msg-2-retry"),
        ]))
        .await;
    chat.regenerate("msg-2").await.unwrap();

    let calls = transport.calls().await;
    match calls.last() {
        Some(TransportCall::Regenerate(request)) => {
            assert_eq!(request.retry_id, "msg-2");
            assert_eq!(request.previous_message_id.as_deref(), Some(human_id.as_str()));
        }
        other => panic!("expected regenerate call, got {:?}", other),
    }

    let path = chat.active_path().unwrap();
    assert_eq!(path[1].message.id, "msg-2-retry");
    assert_eq!(path[1].counter(), "2/2");

    assert!(chat.navigate("msg-2-retry", Direction::Previous).unwrap());
    let path = chat.active_path().unwrap();
    assert_eq!(path[1].message.id, "msg-2");
    assert_eq!(path[1].counter(), "1/2");

    // Already at the oldest alternative
    assert!(!chat.navigate("msg-2", Direction::Previous).unwrap());
    assert!(chat.navigate("msg-2", Direction::Next).unwrap());
    assert_eq!(chat.active_path().unwrap()[1].message.id, "msg-2-retry");
}

#[tokio::test]
async fn test_edit_keeps_original_branch_reachable() {
    let (mut chat, transport) = common::chat("session-1");
    transport.push_reply(common::reply("ai-1", &["Dogs are loyal."])).await;
    transport.push_reply(common::reply("ai-2", &["Tell me more?"])).await;
    chat.submit("Tell me about dogs").await.unwrap();
    chat.submit("More please").await.unwrap();
    let original_id = chat.active_path().unwrap()[0].message.id.clone();

    transport.push_reply(common::reply("ai-3", &["Cats are independent."])).await;
    chat.edit(&original_id, "Tell me about cats").await.unwrap();

    let path = chat.active_path().unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].message.content, "Tell me about cats");
    assert_eq!(path[0].counter(), "2/2");
    assert_eq!(path[1].message.id, "ai-3");

    let revision_id = path[0].message.id.clone();
    chat.navigate(&revision_id, Direction::Previous).unwrap();
    let contents: Vec<String> = chat
        .active_path()
        .unwrap()
        .into_iter()
        .map(|view| view.message.content)
        .collect();
    assert_eq!(
        contents,
        vec![
            "Tell me about dogs",
            "Dogs are loyal.",
            "More please",
            "Tell me more?"
        ]
    );

    let calls = transport.calls().await;
    assert!(calls.iter().any(|call| matches!(
        call,
        TransportCall::Edit(request) if request.edit_id == original_id
    )));
}

#[tokio::test]
async fn test_stop_keeps_partial_content_and_is_idempotent() {
    let (mut chat, transport) = common::chat("session-1");
    transport
        .push_reply(
            ScriptedReply::chunks(vec![
                StreamChunk::begin("ai-1"),
                StreamChunk::item("ai-1", "It was a dark"),
            ])
            .held_open(),
        )
        .await;

    let stopper = chat.stopper();
    let watcher = {
        let stopper = stopper.clone();
        tokio::spawn(async move {
            while !stopper.stop("ai-1") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            // Second request through the handle is ignored
            stopper.stop("ai-1")
        })
    };

    chat.submit("Tell me a story").await.unwrap();
    assert!(!watcher.await.unwrap());

    let ai = chat.store().get("ai-1").unwrap().clone();
    assert_eq!(ai.status, MessageStatus::Stopped);
    assert_eq!(ai.content, "It was a dark");

    assert!(!stopper.stop("ai-1"));
    assert_eq!(chat.store().get("ai-1").unwrap(), &ai);

    let stops = transport
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, TransportCall::Stop { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn test_mid_stream_failure_marks_error_and_keeps_content() {
    let (mut chat, transport) = common::chat("session-1");
    transport
        .push_reply(
            ScriptedReply::chunks(vec![
                StreamChunk::begin("ai-1"),
                StreamChunk::item("ai-1", "Half an answ"),
            ])
            .failing("connection reset"),
        )
        .await;

    let summary = chat.submit("Question").await.unwrap();
    assert!(summary.message_ids.contains(&"ai-1".to_string()));

    let path = chat.active_path().unwrap();
    assert_eq!(path[0].message.status, MessageStatus::Success);
    assert_eq!(path[1].message.status, MessageStatus::Error);
    assert_eq!(path[1].message.content, "Half an answ");
}

#[tokio::test]
async fn test_interleaved_replies_stay_isolated() {
    let (mut chat, transport) = common::chat("session-1");
    transport
        .push_reply(ScriptedReply::chunks(vec![
            StreamChunk::begin("a"),
            StreamChunk::begin("b"),
            StreamChunk::item("a", "1"),
            StreamChunk::item("b", "x"),
            StreamChunk::item("a", "2"),
            StreamChunk::end("a"),
            StreamChunk::item("b", "y"),
            StreamChunk::end("b"),
        ]))
        .await;

    chat.submit("fan out").await.unwrap();
    assert_eq!(chat.store().get("a").unwrap().content, "12");
    assert_eq!(chat.store().get("b").unwrap().content, "xy");
    assert_eq!(chat.store().get("a").unwrap().status, MessageStatus::Success);
    assert_eq!(chat.store().get("b").unwrap().status, MessageStatus::Success);
}

#[tokio::test]
async fn test_sessions_do_not_share_messages() {
    let (mut first, first_transport) = common::chat("session-a");
    let (mut second, second_transport) = common::chat("session-b");
    first_transport.push_reply(common::reply("ai-a", &["A"])).await;
    second_transport.push_reply(common::reply("ai-b", &["B"])).await;

    first.submit("to a").await.unwrap();
    second.submit("to b").await.unwrap();

    assert!(first.store().get("ai-b").is_none());
    assert!(second.store().get("ai-a").is_none());
    assert_eq!(first.store().get_all("session-a").len(), 2);
    assert!(first.store().get_all("session-b").is_empty());
}
