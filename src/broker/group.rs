//! Deliver-to-one rotation for the normal subscribers of one pattern.
//!
//! The cursor holds the index of the member selected most recently, so
//! [`DeliveryGroup::next_member`] hands out the member after it. Membership
//! changes keep the cursor on the same member where possible:
//!
//! - a joining member is inserted immediately before the most recently
//!   selected member, which makes it the last to be served in the current
//!   cycle;
//! - a leaving member that was the most recently selected one hands the cursor
//!   to its predecessor, so its successor is served next.
//!
//! Neither rule skips or repeats a remaining member within a cycle.

use std::sync::Arc;

use crate::broker::topic::SessionId;

#[derive(Debug, Clone)]
pub struct DeliveryGroup {
    pattern: Arc<str>,
    members: Vec<SessionId>,
    cursor: Option<usize>,
}

impl DeliveryGroup {
    /// Forms a group from the pattern's sole subscriber and a newcomer.
    ///
    /// The incumbent has been receiving every message so far, so it counts as
    /// the most recently selected member and the newcomer goes first.
    pub fn form(pattern: Arc<str>, incumbent: SessionId, newcomer: SessionId) -> Self {
        let mut group = Self {
            pattern,
            members: vec![incumbent],
            cursor: Some(0),
        };
        group.join(newcomer);
        group
    }

    pub fn pattern(&self) -> &Arc<str> {
        &self.pattern
    }

    /// Members in rotation order.
    pub fn members(&self) -> &[SessionId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.members.iter().any(|m| m == session_id)
    }

    /// Adds a member. Returns `false` if it was already present.
    pub fn join(&mut self, session_id: SessionId) -> bool {
        if self.contains(&session_id) {
            return false;
        }
        match self.cursor {
            Some(cursor) => {
                self.members.insert(cursor, session_id);
                self.cursor = Some(cursor + 1);
            }
            None => {
                self.members.push(session_id);
                self.cursor = Some(self.members.len() - 1);
            }
        }
        true
    }

    /// Removes a member. Returns `false` if it was not present.
    pub fn leave(&mut self, session_id: &str) -> bool {
        let Some(index) = self.members.iter().position(|m| m == session_id) else {
            return false;
        };
        self.members.remove(index);

        let len = self.members.len();
        self.cursor = match self.cursor {
            _ if len == 0 => None,
            Some(cursor) if index < cursor => Some(cursor - 1),
            Some(cursor) if index == cursor => Some(cursor.checked_sub(1).unwrap_or(len - 1)),
            Some(cursor) => Some(cursor.min(len - 1)),
            None => Some(len - 1),
        };
        true
    }

    /// Advances the rotation and returns the selected member.
    pub fn next_member(&mut self) -> Option<&SessionId> {
        let len = self.members.len();
        if len == 0 {
            self.cursor = None;
            return None;
        }
        let next = match self.cursor {
            Some(cursor) => (cursor.min(len - 1) + 1) % len,
            None => 0,
        };
        self.cursor = Some(next);
        self.members.get(next)
    }
}
