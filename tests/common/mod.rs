use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use chatloom::conversation::ChatController;
use chatloom::streaming::StreamChunk;
use chatloom::transport::{ScriptedReply, ScriptedTransport};
use chatloom::Config;

/// A fixed instant `seconds` after 2025-01-01T00:00:00Z
#[allow(dead_code)]
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base timestamp")
        + Duration::seconds(seconds)
}

/// A complete reply streaming `parts` into message `id`
#[allow(dead_code)]
pub fn reply(id: &str, parts: &[&str]) -> ScriptedReply {
    let mut chunks = vec![StreamChunk::begin(id)];
    chunks.extend(parts.iter().map(|part| StreamChunk::item(id, *part)));
    chunks.push(StreamChunk::end(id));
    ScriptedReply::chunks(chunks)
}

/// A controller sharing its script with the returned transport handle
#[allow(dead_code)]
pub fn chat(session_id: &str) -> (ChatController<ScriptedTransport>, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let controller = ChatController::new(session_id, transport.clone(), Config::default());
    (controller, transport)
}

#[allow(dead_code)]
pub fn temp_fixture(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let path = temp_dir.path().join("fixture.yaml");
    fs::write(&path, contents).expect("failed to write fixture file");
    (temp_dir, path)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
