//! Replay scripted conversations
//!
//! Runs a fixture's actions through a [`ChatController`] backed by the
//! scripted transport and prints the resulting active path.

use crate::commands::fixture::{Action, Fixture, MessageRef};
use crate::config::Config;
use crate::conversation::{ChatController, Direction, MessageStatus, MessageType, PathView, Session};
use crate::error::{ChatError, Result};
use crate::transport::{ConversationSnapshot, ScriptedTransport};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Outcome of one fixture action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    /// Position in the fixture's action list
    pub index: usize,
    /// Human-readable description of the action
    pub action: String,
    /// Error message when the action failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state after a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Session metadata, if the session was started
    pub session: Option<Session>,
    /// The active path, root first
    pub path: Vec<PathView>,
    /// Per-action outcomes
    pub actions: Vec<ActionReport>,
}

impl ReplayReport {
    /// Number of actions that failed
    pub fn failures(&self) -> usize {
        self.actions.iter().filter(|a| a.error.is_some()).count()
    }
}

/// Run the replay command
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `fixture_path` - Fixture file to replay
/// * `json` - Print JSON instead of text
///
/// # Errors
///
/// Returns an error if the fixture cannot be loaded or the final path cannot
/// be resolved. Failing actions are reported, not returned.
pub async fn run_replay(config: Config, fixture_path: &Path, json: bool) -> Result<()> {
    let fixture = Fixture::from_file(fixture_path)?;
    tracing::info!(
        fixture = %fixture_path.display(),
        actions = fixture.actions.len(),
        "Replaying fixture"
    );

    let report = replay_fixture(config, fixture).await?;
    if json {
        let json = serde_json::to_string_pretty(&report).map_err(ChatError::Serialization)?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Runs a fixture and returns the final state
///
/// # Errors
///
/// Returns an error if seeding fails or the final path cannot be resolved
pub async fn replay_fixture(config: Config, fixture: Fixture) -> Result<ReplayReport> {
    let transport = ScriptedTransport::with_capacity(config.stream.channel_capacity);
    for reply in fixture.replies {
        transport.push_reply(reply).await;
    }

    let default_title = config.chat.default_title.clone();
    let mut controller = ChatController::new(fixture.session.id.as_str(), transport, config);

    let seeded = fixture.session.title.is_some() || !fixture.messages.is_empty();
    if seeded {
        let mut session = Session::new(
            fixture.session.id.as_str(),
            fixture.session.title.clone().unwrap_or(default_title),
        );
        session.model = fixture.session.model.clone();
        session.workflow_id = fixture.session.workflow_id.clone();
        controller
            .transport()
            .insert_conversation(ConversationSnapshot {
                session,
                messages: fixture.messages,
            })
            .await;
        controller.load().await?;
    } else if let Some(model) = fixture.session.model.clone() {
        controller.select_model(model)?;
    }

    if let Some(models) = fixture.models {
        controller.transport().set_models(models).await;
        controller.fetch_models().await?;
    }

    let mut reports = Vec::with_capacity(fixture.actions.len());
    let actions = fixture.actions;
    for (index, action) in actions.iter().enumerate() {
        let early_stops = if action.is_generating() {
            stops_following(&actions[index + 1..])
        } else {
            Vec::new()
        };
        let result = run_action(&mut controller, action, early_stops).await;
        if let Err(error) = &result {
            tracing::warn!(index, action = %action, error = %error, "Action failed");
        }
        reports.push(ActionReport {
            index,
            action: action.to_string(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    Ok(ReplayReport {
        session: controller.session().cloned(),
        path: controller.active_path()?,
        actions: reports,
    })
}

/// Ids named by the `stop` actions directly after a generating action
fn stops_following(rest: &[Action]) -> Vec<String> {
    rest.iter()
        .map_while(|action| match action {
            Action::Stop(target) => Some(target),
            _ => None,
        })
        .filter_map(|target| match target {
            MessageRef::Id(id) => Some(id.clone()),
            MessageRef::Depth(_) => None,
        })
        .collect()
}

async fn run_action(
    controller: &mut ChatController<ScriptedTransport>,
    action: &Action,
    early_stops: Vec<String>,
) -> Result<()> {
    let watcher = if early_stops.is_empty() {
        None
    } else {
        let stopper = controller.stopper();
        Some(tokio::spawn(async move {
            for id in early_stops {
                while !stopper.stop(&id) {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            }
        }))
    };

    let result = perform(controller, action).await;
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    result
}

async fn perform(controller: &mut ChatController<ScriptedTransport>, action: &Action) -> Result<()> {
    match action {
        Action::Send(content) => controller.submit(content).await.map(|_| ()),
        Action::Edit { message, content } => {
            let id = resolve(controller, message)?;
            controller.edit(&id, content).await.map(|_| ())
        }
        Action::Regenerate(target) => {
            let id = resolve(controller, target)?;
            controller.regenerate(&id).await.map(|_| ())
        }
        Action::Previous(target) => navigate(controller, target, Direction::Previous),
        Action::Next(target) => navigate(controller, target, Direction::Next),
        Action::Stop(target) => {
            let id = resolve(controller, target)?;
            if !controller.store().contains(&id) {
                return Err(ChatError::NotFound(id).into());
            }
            // Nothing streams between actions; early stops were handled by the watcher
            if !controller.stopper().stop(&id) {
                tracing::debug!(message_id = %id, "Reply is not streaming");
            }
            Ok(())
        }
        Action::SelectModel(selection) => controller.select_model(selection.clone()),
        Action::Rename(title) => controller.rename(title),
    }
}

fn navigate(
    controller: &mut ChatController<ScriptedTransport>,
    target: &MessageRef,
    direction: Direction,
) -> Result<()> {
    let id = resolve(controller, target)?;
    if !controller.navigate(&id, direction)? {
        tracing::info!(message_id = %id, ?direction, "No alternative in that direction");
    }
    Ok(())
}

fn resolve(controller: &ChatController<ScriptedTransport>, target: &MessageRef) -> Result<String> {
    match target {
        MessageRef::Id(id) => Ok(id.clone()),
        MessageRef::Depth(depth) => controller
            .active_path()?
            .get(*depth)
            .map(|view| view.message.id.clone())
            .ok_or_else(|| {
                ChatError::NotFound(format!("no message at depth {}", depth)).into()
            }),
    }
}

fn print_report(report: &ReplayReport) {
    match &report.session {
        Some(session) => {
            println!("\n{}", session.title.bold());
            if let Some(model) = &session.model {
                println!("Model: {}", model.to_string().cyan());
            }
        }
        None => println!("\n{}", "(session not started)".dimmed()),
    }
    println!();

    for view in &report.path {
        let name = match view.message.message_type {
            MessageType::Human => view.message.name.cyan().bold(),
            MessageType::Ai => view.message.name.green().bold(),
        };
        let counter = if view.has_alternatives() {
            format!(" [{}]", view.counter()).yellow().to_string()
        } else {
            String::new()
        };
        println!("{}{} {}", name, counter, status_label(view.message.status));
        if view.message.content.is_empty() {
            println!("  {}", "(no content)".dimmed());
        } else {
            for line in view.message.content.lines() {
                println!("  {}", line);
            }
        }
        println!();
    }

    let failures: Vec<&ActionReport> = report.actions.iter().filter(|a| a.error.is_some()).collect();
    if !failures.is_empty() {
        println!("{}", "Failed actions:".red().bold());
        for failure in failures {
            println!(
                "  #{} {}: {}",
                failure.index,
                failure.action,
                failure.error.as_deref().unwrap_or_default()
            );
        }
    }
}

fn status_label(status: MessageStatus) -> String {
    let label = format!("({})", status);
    match status {
        MessageStatus::Success => label.dimmed().to_string(),
        MessageStatus::Pending => label.blue().to_string(),
        MessageStatus::Error => label.red().to_string(),
        MessageStatus::Stopped => label.yellow().to_string(),
    }
}
