//! Topic validation and wildcard subscription matching.
//!
//! Topics are `/`-delimited levels. Subscription patterns may use `*` as a
//! whole level to match exactly one level, and `>` as the last level to match
//! one or more trailing levels. Published topics never contain wildcards.
//!
//! Patterns are stored in a level trie: each node corresponds to exactly one
//! pattern, so a `(session, pattern)` pair is reported at most once per match.
//!
//! Concurrency note: callers must synchronize access to `TopicMatcher` (the
//! broker keeps it behind its routing lock).

use std::collections::HashMap;
use std::sync::Arc;

use crate::utils::error::{PubSubError, Result};

pub type SessionId = String;

pub const LEVEL_SEPARATOR: char = '/';
pub const ONE_LEVEL_WILDCARD: &str = "*";
pub const TRAILING_WILDCARD: &str = ">";

const WILDCARD_CHARS: [char; 2] = ['*', '>'];

/// How a subscription takes part in deliver-to-one rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubscriptionMode {
    /// Shares messages with the other normal subscribers of the same pattern.
    #[default]
    Normal,
    /// Deliver-to-one override: receives every matching message and never
    /// joins a rotation.
    DeliverAlways,
}

impl SubscriptionMode {
    pub fn is_override(self) -> bool {
        matches!(self, Self::DeliverAlways)
    }
}

/// A subscription as recorded by the session that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub session_id: SessionId,
    pub pattern: String,
    pub mode: SubscriptionMode,
}

/// One registered subscription that matched a published topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub session_id: SessionId,
    pub pattern: Arc<str>,
    pub mode: SubscriptionMode,
}

/// Checks that `topic` can be published to.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(PubSubError::invalid_topic(topic, "topic is empty"));
    }
    if topic.contains(WILDCARD_CHARS) {
        return Err(PubSubError::invalid_topic(
            topic,
            "published topics cannot contain wildcards",
        ));
    }
    if topic.split(LEVEL_SEPARATOR).any(str::is_empty) {
        return Err(PubSubError::invalid_topic(topic, "topic has an empty level"));
    }
    Ok(())
}

/// Checks that `pattern` is a well-formed subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(PubSubError::invalid_topic(pattern, "pattern is empty"));
    }
    let levels: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        match *level {
            "" => return Err(PubSubError::invalid_topic(pattern, "pattern has an empty level")),
            ONE_LEVEL_WILDCARD => {}
            TRAILING_WILDCARD if i == last => {}
            TRAILING_WILDCARD => {
                return Err(PubSubError::invalid_topic(
                    pattern,
                    "'>' is only allowed as the last level",
                ));
            }
            literal if literal.contains(WILDCARD_CHARS) => {
                return Err(PubSubError::invalid_topic(
                    pattern,
                    "wildcards must occupy a whole level",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    any_level: Option<Box<Node>>,
    trailing: Option<Box<Node>>,
    subscribers: HashMap<SessionId, SubscriptionMode>,
    pattern: Option<Arc<str>>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
            && self.children.is_empty()
            && self.any_level.is_none()
            && self.trailing.is_none()
    }
}

/// Index from subscription patterns to the sessions registered on them.
#[derive(Debug, Default)]
pub struct TopicMatcher {
    root: Node,
    len: usize,
}

impl TopicMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session_id` on `pattern`.
    ///
    /// Re-subscribing to the same pattern replaces the mode and returns the
    /// previous one.
    pub fn subscribe(
        &mut self,
        session_id: &str,
        pattern: &str,
        mode: SubscriptionMode,
    ) -> Result<Option<SubscriptionMode>> {
        validate_pattern(pattern)?;

        let mut node = &mut self.root;
        for level in pattern.split(LEVEL_SEPARATOR) {
            node = match level {
                ONE_LEVEL_WILDCARD => &mut **node.any_level.get_or_insert_with(Box::default),
                TRAILING_WILDCARD => &mut **node.trailing.get_or_insert_with(Box::default),
                literal => node.children.entry(literal.to_string()).or_default(),
            };
        }
        node.pattern.get_or_insert_with(|| Arc::from(pattern));

        let previous = node.subscribers.insert(session_id.to_string(), mode);
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }

    /// Removes `session_id` from `pattern`. Absent registrations are ignored.
    pub fn unsubscribe(&mut self, session_id: &str, pattern: &str) -> Option<SubscriptionMode> {
        let levels: Vec<&str> = pattern.split(LEVEL_SEPARATOR).collect();
        let removed = Self::remove(&mut self.root, &levels, session_id);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Every subscription whose pattern matches the published `topic`.
    pub fn matches(&self, topic: &str) -> Result<Vec<Match>> {
        validate_topic(topic)?;

        let levels: Vec<&str> = topic.split(LEVEL_SEPARATOR).collect();
        let mut found = Vec::new();
        Self::collect(&self.root, &levels, &mut found);
        Ok(found)
    }

    /// Sessions registered on exactly `pattern`, with their modes.
    pub fn subscribers(&self, pattern: &str) -> Vec<(SessionId, SubscriptionMode)> {
        let mut node = &self.root;
        for level in pattern.split(LEVEL_SEPARATOR) {
            let next = match level {
                ONE_LEVEL_WILDCARD => node.any_level.as_deref(),
                TRAILING_WILDCARD => node.trailing.as_deref(),
                literal => node.children.get(literal),
            };
            match next {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.subscribers
            .iter()
            .map(|(id, mode)| (id.clone(), *mode))
            .collect()
    }

    /// Number of registered `(session, pattern)` pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn collect(node: &Node, levels: &[&str], found: &mut Vec<Match>) {
        let Some((head, tail)) = levels.split_first() else {
            Self::emit(node, found);
            return;
        };

        // '>' here swallows the remaining levels, of which there is at least one
        if let Some(trailing) = &node.trailing {
            Self::emit(trailing, found);
        }
        if let Some(child) = node.children.get(*head) {
            Self::collect(child, tail, found);
        }
        if let Some(any) = &node.any_level {
            Self::collect(any, tail, found);
        }
    }

    fn emit(node: &Node, found: &mut Vec<Match>) {
        let Some(pattern) = &node.pattern else {
            return;
        };
        found.extend(node.subscribers.iter().map(|(id, mode)| Match {
            session_id: id.clone(),
            pattern: Arc::clone(pattern),
            mode: *mode,
        }));
    }

    fn remove(node: &mut Node, levels: &[&str], session_id: &str) -> Option<SubscriptionMode> {
        let Some((head, tail)) = levels.split_first() else {
            let removed = node.subscribers.remove(session_id);
            if node.subscribers.is_empty() {
                node.pattern = None;
            }
            return removed;
        };

        match *head {
            ONE_LEVEL_WILDCARD => {
                let child = node.any_level.as_deref_mut()?;
                let removed = Self::remove(child, tail, session_id);
                if child.is_empty() {
                    node.any_level = None;
                }
                removed
            }
            TRAILING_WILDCARD => {
                let child = node.trailing.as_deref_mut()?;
                let removed = Self::remove(child, tail, session_id);
                if child.is_empty() {
                    node.trailing = None;
                }
                removed
            }
            literal => {
                let child = node.children.get_mut(literal)?;
                let removed = Self::remove(child, tail, session_id);
                if child.is_empty() {
                    node.children.remove(literal);
                }
                removed
            }
        }
    }
}
