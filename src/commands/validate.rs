//! Validate fixture messages
//!
//! Builds the revision graph of a fixture's seed messages and reports links
//! that point nowhere, alternative groups and cycles.

use crate::commands::fixture::Fixture;
use crate::conversation::{Message, Navigation, RevisionGraph};
use crate::error::Result;
use colored::Colorize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A link naming a message that is not in the fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    /// Message holding the link
    pub message_id: String,
    /// Which link field
    pub field: &'static str,
    /// The missing target
    pub target: String,
}

/// Findings for one session's messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCheck {
    /// Number of messages
    pub messages: usize,
    /// Length of the default active path
    pub path_len: usize,
    /// Alternative groups with more than one member, as `(base id, size)`
    pub alternatives: Vec<(String, usize)>,
    /// Links to unknown messages
    pub broken_links: Vec<BrokenLink>,
}

/// Run the validate command
///
/// # Arguments
///
/// * `fixture_path` - Fixture file to check
///
/// # Errors
///
/// Returns [`ChatError::CycleDetected`](crate::error::ChatError::CycleDetected) if any session's messages form a
/// cycle, or a fixture error if the file cannot be loaded
pub fn run_validate(fixture_path: &Path) -> Result<()> {
    let fixture = Fixture::from_file(fixture_path)?;
    let checks = check_fixture(&fixture)?;

    println!(
        "{} {} ({} session(s), {} message(s), {} action(s))",
        "Valid:".green().bold(),
        fixture_path.display(),
        checks.len(),
        fixture.messages.len(),
        fixture.actions.len()
    );
    for (session_id, check) in &checks {
        println!(
            "  {}: {} message(s), active path of {}",
            session_id.cyan(),
            check.messages,
            check.path_len
        );
        for (base, size) in &check.alternatives {
            println!("    {} alternatives of {}", size, base);
        }
        for link in &check.broken_links {
            println!(
                "    {} {} of {} points to unknown {}",
                "warning:".yellow(),
                link.field,
                link.message_id,
                link.target
            );
        }
    }
    Ok(())
}

/// Checks every session in a fixture
///
/// # Errors
///
/// Returns [`ChatError::CycleDetected`](crate::error::ChatError::CycleDetected) on the first cyclic session
pub fn check_fixture(fixture: &Fixture) -> Result<BTreeMap<String, SessionCheck>> {
    let mut by_session: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
    for message in &fixture.messages {
        by_session
            .entry(message.session_id.clone())
            .or_default()
            .push(message);
    }

    let mut checks = BTreeMap::new();
    for (session_id, messages) in by_session {
        let check = check_session(&messages).map_err(|error| {
            tracing::error!(session_id = %session_id, error = %error, "Fixture session is invalid");
            error
        })?;
        checks.insert(session_id, check);
    }
    Ok(checks)
}

fn check_session(messages: &[&Message]) -> Result<SessionCheck> {
    let graph = RevisionGraph::build(messages.iter().copied())?;
    let path = graph.active_path(None, &Navigation::new())?;

    let ids: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    let mut broken_links = Vec::new();
    for message in messages {
        let links = [
            ("previousMessageId", &message.previous_message_id),
            ("retryOfMessageId", &message.retry_of_message_id),
            ("revisionOfMessageId", &message.revision_of_message_id),
        ];
        for (field, target) in links {
            if let Some(target) = target {
                if !ids.contains(target.as_str()) {
                    broken_links.push(BrokenLink {
                        message_id: message.id.clone(),
                        field,
                        target: target.clone(),
                    });
                }
            }
        }
    }

    let mut alternatives = Vec::new();
    let mut seen = HashSet::new();
    for message in messages {
        if let Some(group) = graph.alternatives(&message.id) {
            if group.len() > 1 && seen.insert(group.key().clone()) {
                alternatives.push((group.key().base.clone(), group.len()));
            }
        }
    }

    Ok(SessionCheck {
        messages: messages.len(),
        path_len: path.len(),
        alternatives,
        broken_links,
    })
}
