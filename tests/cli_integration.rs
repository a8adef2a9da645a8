//! Integration tests for the chatloom command-line interface
//!
//! Runs the built binary against temporary fixture and config files.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

const HELLO_FIXTURE: &str = r#"
replies:
  - chunks:
      - { type: begin, metadata: { messageId: ai-message-123 } }
      - { type: item, content: "Hello! ", metadata: { messageId: ai-message-123 } }
      - { type: item, content: "How can I help?", metadata: { messageId: ai-message-123 } }
      - { type: end, metadata: { messageId: ai-message-123 } }
actions:
  - send: "Hello, AI!"
"#;

const CYCLIC_FIXTURE: &str = r#"
messages:
  - { id: a, sessionId: s, type: human, name: User, previousMessageId: b, createdAt: "2025-01-01T00:00:00Z", updatedAt: "2025-01-01T00:00:00Z" }
  - { id: b, sessionId: s, type: ai, name: AI, previousMessageId: a, createdAt: "2025-01-01T00:00:01Z", updatedAt: "2025-01-01T00:00:01Z" }
"#;

#[test]
fn test_replay_prints_active_path() {
    let (_temp_dir, fixture) = common::temp_fixture(HELLO_FIXTURE);

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.env("NO_COLOR", "1").arg("replay").arg(&fixture);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hello, AI!"))
        .stdout(predicate::str::contains("Hello! How can I help?"));
}

#[test]
fn test_replay_json_output() {
    let (_temp_dir, fixture) = common::temp_fixture(HELLO_FIXTURE);

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.arg("replay").arg(&fixture).arg("--json");

    let output = cmd.assert().success().get_output().stdout.clone();
    let report: serde_json::Value =
        serde_json::from_slice(&output).expect("replay --json prints valid JSON");

    let path = report["path"].as_array().expect("path is an array");
    assert_eq!(path.len(), 2);
    assert_eq!(path[1]["message"]["id"], "ai-message-123");
    assert_eq!(path[1]["message"]["content"], "Hello! How can I help?");
    assert_eq!(path[1]["message"]["status"], "success");
    assert_eq!(report["session"]["title"], "Hello, AI!");
}

#[test]
fn test_replay_missing_fixture_fails() {
    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.arg("replay").arg("does-not-exist.yaml");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Fixture error"));
}

#[test]
fn test_replay_uses_config_file() {
    let (_fixture_dir, fixture) = common::temp_fixture(HELLO_FIXTURE);
    let (_config_dir, config) = common::temp_config_file(
        r#"
chat:
  user_name: Ada
  assistant_name: Loom
"#,
    );

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&fixture)
        .arg("--json");

    let output = cmd.assert().success().get_output().stdout.clone();
    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["path"][0]["message"]["name"], "Ada");
    assert_eq!(report["path"][1]["message"]["name"], "Loom");
}

#[test]
fn test_missing_config_file_is_reported_in_logs() {
    let (_temp_dir, fixture) = common::temp_fixture(HELLO_FIXTURE);

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("CHATLOOM_LOG_LEVEL")
        .arg("--config")
        .arg("no/such/config.yaml")
        .arg("validate")
        .arg(&fixture);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Config file not found at no/such/config.yaml"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_fixture_dir, fixture) = common::temp_fixture(HELLO_FIXTURE);
    let (_config_dir, config) = common::temp_config_file(
        r#"
stream:
  channel_capacity: 0
"#,
    );

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.arg("--config").arg(&config).arg("replay").arg(&fixture);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_validate_accepts_acyclic_fixture() {
    let fixture_yaml = r#"
messages:
  - { id: msg-1, sessionId: s, type: human, name: User, createdAt: "2025-01-01T00:00:00Z", updatedAt: "2025-01-01T00:00:00Z" }
  - { id: msg-2, sessionId: s, type: ai, name: AI, previousMessageId: msg-1, createdAt: "2025-01-01T00:00:01Z", updatedAt: "2025-01-01T00:00:01Z" }
"#;
    let (_temp_dir, fixture) = common::temp_fixture(fixture_yaml);

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.env("NO_COLOR", "1").arg("validate").arg(&fixture);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Valid:"))
        .stdout(predicate::str::contains("active path of 2"));
}

#[test]
fn test_validate_rejects_cycle() {
    let (_temp_dir, fixture) = common::temp_fixture(CYCLIC_FIXTURE);

    let mut cmd = Command::cargo_bin("chatloom").unwrap();
    cmd.arg("validate").arg(&fixture);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Cycle detected"));
}
