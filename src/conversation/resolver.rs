//! Revision graph resolution
//!
//! Messages link to the message they answer through `previous_message_id`,
//! which makes a session's message set a forest. Siblings that retry or edit
//! each other form an *alternative group*; exactly one member of one group is
//! shown per depth. This module builds that graph and walks it to produce the
//! active path the user sees.
//!
//! # Algorithm
//!
//! 1. Index children by parent id (session roots share the `None` parent).
//! 2. Partition each sibling set into groups by following
//!    `retry_of_message_id` / `revision_of_message_id` transitively to a base.
//! 3. Walk from the root level: pick the active group, then its active member,
//!    then descend into that member's children until none remain.
//!
//! Without navigation state the most recently created member wins, and among
//! several independent groups under one parent the group holding the most
//! recent message wins. [`Navigation`] pins override both.

use crate::conversation::message::Message;
use crate::error::{ChatError, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Identifies one alternative group: its parent and the id of its base member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    /// Parent message id, `None` for the session root level
    pub parent: Option<String>,
    /// Id of the member every other member retries or revises
    pub base: String,
}

/// Siblings competing for one depth of the conversation
#[derive(Debug, Clone)]
pub struct AlternativeGroup<'a> {
    key: GroupKey,
    /// Ordered oldest first
    members: Vec<&'a Message>,
}

impl<'a> AlternativeGroup<'a> {
    /// The group's key
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Members ordered by creation time, oldest first
    pub fn members(&self) -> &[&'a Message] {
        &self.members
    }

    /// Number of alternatives
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true when the group has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Zero-based position of `message_id` in the group
    pub fn position_of(&self, message_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m.id == message_id)
    }
}

/// One depth of the active path
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry<'a> {
    /// The message shown at this depth
    pub message: &'a Message,
    /// Zero-based depth in the path
    pub depth: usize,
    /// One-based position within its alternative group
    pub position: usize,
    /// Size of its alternative group
    pub total: usize,
    /// The alternative group the message belongs to
    pub group: GroupKey,
}

impl PathEntry<'_> {
    /// Counter shown next to a message with alternatives, e.g. `2/2`
    pub fn counter(&self) -> String {
        format!("{}/{}", self.position, self.total)
    }

    /// Returns true when the message has more than one alternative
    pub fn has_alternatives(&self) -> bool {
        self.total > 1
    }
}

/// The single linear conversation currently displayed
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ActivePath<'a> {
    entries: Vec<PathEntry<'a>>,
}

impl<'a> ActivePath<'a> {
    /// Entries from the root down
    pub fn entries(&self) -> &[PathEntry<'a>] {
        &self.entries
    }

    /// The displayed messages from the root down
    pub fn messages(&self) -> Vec<&'a Message> {
        self.entries.iter().map(|entry| entry.message).collect()
    }

    /// Ids of the displayed messages from the root down
    pub fn ids(&self) -> Vec<&'a str> {
        self.entries
            .iter()
            .map(|entry| entry.message.id.as_str())
            .collect()
    }

    /// The entry showing `message_id`, if it is on the path
    pub fn find(&self, message_id: &str) -> Option<&PathEntry<'a>> {
        self.entries
            .iter()
            .find(|entry| entry.message.id == message_id)
    }

    /// The deepest entry
    pub fn last(&self) -> Option<&PathEntry<'a>> {
        self.entries.last()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true for an empty conversation
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Direction for alternative navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards older alternatives
    Previous,
    /// Towards newer alternatives
    Next,
}

/// User navigation state over alternative groups
///
/// Kept separately from the messages so that a manual choice survives
/// recomputation of the path.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pins: HashMap<GroupKey, usize>,
    active_groups: HashMap<Option<String>, String>,
}

impl Navigation {
    /// Creates navigation state with nothing pinned
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the member at zero-based `index` of a group
    ///
    /// The group also becomes the active one among its parent's groups.
    pub fn pin(&mut self, key: GroupKey, index: usize) {
        self.active_groups
            .insert(key.parent.clone(), key.base.clone());
        self.pins.insert(key, index);
    }

    /// Removes a pin so the group falls back to its newest member
    pub fn unpin(&mut self, key: &GroupKey) {
        self.pins.remove(key);
        if self.active_groups.get(&key.parent) == Some(&key.base) {
            self.active_groups.remove(&key.parent);
        }
    }

    /// Lets the newest message under the group's parent win again
    ///
    /// Unlike [`Navigation::unpin`] this also drops an active-group choice
    /// made for a sibling group under the same parent.
    pub fn follow_latest(&mut self, key: &GroupKey) {
        self.pins.remove(key);
        self.active_groups.remove(&key.parent);
    }

    /// The pinned index of a group, if any
    pub fn pinned(&self, key: &GroupKey) -> Option<usize> {
        self.pins.get(key).copied()
    }

    /// Forgets every pin
    pub fn clear(&mut self) {
        self.pins.clear();
        self.active_groups.clear();
    }

    /// Returns true when nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty() && self.active_groups.is_empty()
    }

    fn active_group(&self, parent: &Option<String>) -> Option<&str> {
        self.active_groups.get(parent).map(String::as_str)
    }

    /// Moves the selection at `message_id`'s depth one alternative over
    ///
    /// Pins below that depth on the current path are discarded, so the
    /// descendants of the newly selected alternative are resolved fresh.
    ///
    /// # Returns
    ///
    /// Returns false when already at the first/last alternative
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `message_id` is not on `path`
    pub fn step(&mut self, path: &ActivePath<'_>, message_id: &str, direction: Direction) -> Result<bool> {
        let entry = path
            .find(message_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;

        let current = entry.position - 1;
        let target = match direction {
            Direction::Previous if current > 0 => current - 1,
            Direction::Next if current + 1 < entry.total => current + 1,
            _ => return Ok(false),
        };

        for below in &path.entries()[entry.depth + 1..] {
            self.unpin(&below.group);
        }
        self.pin(entry.group.clone(), target);
        tracing::debug!(
            message_id,
            from = current + 1,
            to = target + 1,
            total = entry.total,
            "Navigated alternative"
        );
        Ok(true)
    }
}

/// Indexed view of a session's messages
#[derive(Debug, Clone)]
pub struct RevisionGraph<'a> {
    by_id: HashMap<&'a str, &'a Message>,
    groups: Vec<AlternativeGroup<'a>>,
    /// Parent id -> indices into `groups`, ordered by first member
    children: HashMap<Option<&'a str>, Vec<usize>>,
    group_of: HashMap<&'a str, usize>,
    /// Arrival position of every message, for tie-breaking
    order: HashMap<&'a str, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl<'a> RevisionGraph<'a> {
    /// Indexes a session's messages
    ///
    /// The iteration order of `messages` is used to break ties between
    /// messages created at the same instant; later means newer.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::CycleDetected`] if the `previous_message_id`
    /// links contain a cycle
    pub fn build<I>(messages: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let mut by_id: HashMap<&'a str, &'a Message> = HashMap::new();
        let mut order: HashMap<&'a str, usize> = HashMap::new();
        let mut arrival: Vec<&'a Message> = Vec::new();

        for (position, message) in messages.into_iter().enumerate() {
            if by_id.insert(message.id.as_str(), message).is_some() {
                tracing::warn!(message_id = %message.id, "Duplicate message id; keeping the later copy");
                arrival.retain(|m| m.id != message.id);
            }
            order.insert(message.id.as_str(), position);
            arrival.push(message);
        }

        check_acyclic(&by_id, &arrival)?;

        // Sibling sets in arrival order
        let mut siblings: HashMap<Option<&'a str>, Vec<&'a Message>> = HashMap::new();
        let mut parents: Vec<Option<&'a str>> = Vec::new();
        for message in &arrival {
            let parent = message.previous_message_id.as_deref();
            if let Some(parent_id) = parent {
                if !by_id.contains_key(parent_id) {
                    tracing::warn!(
                        message_id = %message.id,
                        previous_message_id = parent_id,
                        "Dangling previous message link; message is unreachable"
                    );
                    continue;
                }
            }
            siblings
                .entry(parent)
                .or_insert_with(|| {
                    parents.push(parent);
                    Vec::new()
                })
                .push(message);
        }

        let mut graph = Self {
            by_id,
            groups: Vec::new(),
            children: HashMap::new(),
            group_of: HashMap::new(),
            order,
        };

        for parent in parents {
            let set = siblings.remove(&parent).unwrap_or_default();
            graph.add_sibling_groups(parent, set);
        }

        Ok(graph)
    }

    fn add_sibling_groups(&mut self, parent: Option<&'a str>, set: Vec<&'a Message>) {
        let sibling_ids: HashSet<&str> = set.iter().map(|m| m.id.as_str()).collect();
        let by_id = &self.by_id;

        let mut by_base: HashMap<&'a str, Vec<&'a Message>> = HashMap::new();
        let mut bases: Vec<&'a str> = Vec::new();
        for message in set {
            let base = base_of(message, by_id, &sibling_ids);
            by_base
                .entry(base)
                .or_insert_with(|| {
                    bases.push(base);
                    Vec::new()
                })
                .push(message);
        }

        let mut groups: Vec<AlternativeGroup<'a>> = bases
            .into_iter()
            .map(|base| {
                let mut members = by_base.remove(base).unwrap_or_default();
                members.sort_by_key(|m| (m.created_at, self.order[m.id.as_str()]));
                AlternativeGroup {
                    key: GroupKey {
                        parent: parent.map(str::to_string),
                        base: base.to_string(),
                    },
                    members,
                }
            })
            .collect();
        groups.sort_by_key(|group| {
            let first = group.members[0];
            (first.created_at, self.order[first.id.as_str()])
        });

        let mut indices = Vec::with_capacity(groups.len());
        for group in groups {
            let index = self.groups.len();
            for member in &group.members {
                self.group_of.insert(member.id.as_str(), index);
            }
            indices.push(index);
            self.groups.push(group);
        }
        self.children.insert(parent, indices);
    }

    /// Looks up a message
    pub fn get(&self, message_id: &str) -> Option<&'a Message> {
        self.by_id.get(message_id).copied()
    }

    /// Number of indexed messages
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true when the graph holds no messages
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// The alternative group containing `message_id`
    ///
    /// Messages with a dangling parent belong to no group.
    pub fn alternatives(&self, message_id: &str) -> Option<&AlternativeGroup<'a>> {
        self.group_of
            .get(message_id)
            .map(|&index| &self.groups[index])
    }

    /// Groups directly under `parent` (`None` for the root level)
    pub fn groups_under(&self, parent: Option<&str>) -> Vec<&AlternativeGroup<'a>> {
        let key: Option<&'a str> = match parent {
            None => None,
            Some(id) => match self.by_id.get_key_value(id) {
                Some((known, _)) => Some(*known),
                None => return Vec::new(),
            },
        };
        self.children
            .get(&key)
            .map(|indices| indices.iter().map(|&i| &self.groups[i]).collect())
            .unwrap_or_default()
    }

    /// The chain from `message_id` back to its root, message first
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `message_id` or one of its
    /// ancestors is unknown
    pub fn ancestry(&self, message_id: &str) -> Result<Vec<&'a Message>> {
        let mut chain = Vec::new();
        let mut current = self
            .get(message_id)
            .ok_or_else(|| ChatError::NotFound(message_id.to_string()))?;
        loop {
            if chain.len() > self.by_id.len() {
                return Err(ChatError::CycleDetected(current.id.clone()).into());
            }
            chain.push(current);
            match current.previous_message_id.as_deref() {
                None => return Ok(chain),
                Some(parent) => {
                    current = self
                        .get(parent)
                        .ok_or_else(|| ChatError::NotFound(parent.to_string()))?;
                }
            }
        }
    }

    /// Resolves the displayed path
    ///
    /// Starts at the session root level, or at `root` when given (the root
    /// message itself is the first entry).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotFound`] if `root` is unknown and
    /// [`ChatError::CycleDetected`] if the walk revisits a message
    pub fn active_path(&self, root: Option<&str>, navigation: &Navigation) -> Result<ActivePath<'a>> {
        let mut entries: Vec<PathEntry<'a>> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();

        let mut parent: Option<&'a str> = match root {
            None => None,
            Some(root_id) => {
                let message = self
                    .get(root_id)
                    .ok_or_else(|| ChatError::NotFound(root_id.to_string()))?;
                let (position, total, group) = match self.alternatives(root_id) {
                    Some(group) => (
                        group.position_of(root_id).map_or(1, |p| p + 1),
                        group.len(),
                        group.key.clone(),
                    ),
                    None => (
                        1,
                        1,
                        GroupKey {
                            parent: message.previous_message_id.clone(),
                            base: message.id.clone(),
                        },
                    ),
                };
                visited.insert(message.id.as_str());
                entries.push(PathEntry {
                    message,
                    depth: 0,
                    position,
                    total,
                    group,
                });
                Some(message.id.as_str())
            }
        };

        loop {
            let Some(indices) = self.children.get(&parent) else {
                break;
            };
            let Some(group) = self.choose_group(indices, navigation) else {
                break;
            };
            let index = choose_member(group, navigation);
            let message = group.members[index];

            if !visited.insert(message.id.as_str()) {
                return Err(ChatError::CycleDetected(message.id.clone()).into());
            }
            entries.push(PathEntry {
                message,
                depth: entries.len(),
                position: index + 1,
                total: group.len(),
                group: group.key.clone(),
            });
            parent = Some(message.id.as_str());
        }

        Ok(ActivePath { entries })
    }

    fn choose_group(&self, indices: &[usize], navigation: &Navigation) -> Option<&AlternativeGroup<'a>> {
        let first = self.groups.get(*indices.first()?)?;
        if let Some(base) = navigation.active_group(&first.key.parent) {
            if let Some(&index) = indices.iter().find(|&&i| self.groups[i].key.base == base) {
                return Some(&self.groups[index]);
            }
        }
        indices
            .iter()
            .map(|&i| &self.groups[i])
            .max_by_key(|group| {
                let newest = group.members[group.members.len() - 1];
                (newest.created_at, self.order[newest.id.as_str()])
            })
    }
}

fn choose_member(group: &AlternativeGroup<'_>, navigation: &Navigation) -> usize {
    let newest = group.len() - 1;
    match navigation.pinned(&group.key) {
        None => newest,
        Some(index) if index <= newest => index,
        Some(index) => {
            let stale = ChatError::StaleSelection {
                index,
                len: group.len(),
            };
            tracing::warn!(base = %group.key.base, error = %stale, "Clamping alternative selection");
            newest
        }
    }
}

/// Follows retry/revision links through siblings to the group's base
fn base_of<'a>(
    message: &'a Message,
    by_id: &HashMap<&'a str, &'a Message>,
    sibling_ids: &HashSet<&str>,
) -> &'a str {
    let mut current = message;
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(current.id.as_str());
    while let Some(target) = current.replaces() {
        if !sibling_ids.contains(target) {
            if !by_id.contains_key(target) {
                tracing::debug!(message_id = %current.id, target, "Replaced message is unknown");
            }
            break;
        }
        let Some(next) = by_id.get(target).copied() else {
            break;
        };
        if !seen.insert(next.id.as_str()) {
            break;
        }
        current = next;
    }
    current.id.as_str()
}

/// Rejects cycles in the `previous_message_id` links
fn check_acyclic(by_id: &HashMap<&str, &Message>, messages: &[&Message]) -> Result<()> {
    let mut state: HashMap<&str, Visit> = HashMap::with_capacity(messages.len());

    for start in messages {
        let mut stack: Vec<&str> = Vec::new();
        let mut current: Option<&Message> = Some(start);

        while let Some(message) = current {
            match state.get(message.id.as_str()) {
                Some(Visit::Done) => break,
                Some(Visit::InProgress) => {
                    return Err(ChatError::CycleDetected(message.id.clone()).into());
                }
                None => {}
            }
            state.insert(message.id.as_str(), Visit::InProgress);
            stack.push(message.id.as_str());
            current = message
                .previous_message_id
                .as_deref()
                .and_then(|parent| by_id.get(parent).copied());
        }

        for id in stack {
            state.insert(id, Visit::Done);
        }
    }
    Ok(())
}

/// Builds the graph and resolves the active path in one call
///
/// # Examples
///
/// ```
/// use chatloom::conversation::{resolve_active_path, Message, Navigation};
///
/// let messages = vec![
///     Message::human("msg-1", "s", "Hello"),
///     Message::ai("msg-2", "s").with_previous("msg-1"),
/// ];
/// let path = resolve_active_path(&messages, None, &Navigation::new()).unwrap();
/// assert_eq!(path.ids(), vec!["msg-1", "msg-2"]);
/// ```
pub fn resolve_active_path<'a, I>(
    messages: I,
    root: Option<&str>,
    navigation: &Navigation,
) -> Result<ActivePath<'a>>
where
    I: IntoIterator<Item = &'a Message>,
{
    RevisionGraph::build(messages)?.active_path(root, navigation)
}
