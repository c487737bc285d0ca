//! Broker engine
//!
//! This module contains the in-memory broker responsible for:
//! - registering connected sessions
//! - indexing subscriptions in the topic matcher
//! - forming and rotating deliver-to-one groups
//! - routing published messages and counting deliveries
//!
//! Concurrency and usage notes:
//! - The broker is shared as `Arc<Broker>`; every session holds a clone. The
//!   broker itself only keeps weak references to sessions, keyed by id.
//! - The matcher, the groups and the session registry live behind a single
//!   routing lock. A publish resolves its recipients under that lock and
//!   invokes handlers after releasing it, so a slow handler never blocks other
//!   publishes or subscription changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::broker::group::DeliveryGroup;
use crate::broker::message::{DeliveryMode, DeliveryReport, Message};
use crate::broker::stats::{BrokerStats, Counters};
use crate::broker::topic::{Match, SessionId, Subscription, SubscriptionMode, TopicMatcher};
use crate::client::{Session, SessionCore};
use crate::config::BrokerSettings;
use crate::utils::error::{PubSubError, Result};

#[derive(Debug)]
pub struct Broker {
    routing: Mutex<RoutingTable>,
    totals: Counters,
    max_sessions: usize,
}

#[derive(Debug, Default)]
struct RoutingTable {
    matcher: TopicMatcher,
    groups: HashMap<Arc<str>, DeliveryGroup>,
    sessions: HashMap<SessionId, Weak<SessionCore>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Creates a broker with the default settings.
    pub fn new() -> Self {
        Self::with_settings(&BrokerSettings::default())
    }

    pub fn with_settings(settings: &BrokerSettings) -> Self {
        Self {
            routing: Mutex::new(RoutingTable::default()),
            totals: Counters::default(),
            max_sessions: settings.max_sessions,
        }
    }

    /// Routes a message published by `from` and delivers it.
    ///
    /// Override subscribers always receive the message. For every matching
    /// pattern with normal subscribers, exactly one of them receives it: the
    /// next member of the pattern's delivery group, or the sole subscriber when
    /// no group has formed.
    pub fn publish(
        &self,
        from: &Session,
        topic: &str,
        payload: impl Into<Bytes>,
        delivery_mode: DeliveryMode,
        sequence_number: Option<u64>,
    ) -> Result<DeliveryReport> {
        let publisher = from.core();
        publisher.require_connected()?;

        let message = Message::new(topic, payload)
            .with_sender(publisher.id().clone())
            .with_delivery_mode(delivery_mode)
            .with_sequence_number(sequence_number);

        let targets = {
            let mut table = self.table();
            if !table.sessions.contains_key(publisher.id()) {
                return Err(PubSubError::Connection(format!(
                    "session {} is not attached to this broker",
                    publisher.id()
                )));
            }
            let matches = table.matcher.matches(topic)?;
            let selected = table.select_recipients(matches);
            table.resolve(selected)
        };

        publisher.counters().record_sent();
        self.totals.record_sent();

        let mut report = DeliveryReport::new(&message);
        for target in targets {
            if target.deliver(&message) {
                self.totals.record_received();
                report.recipients.push(target.id().clone());
            }
        }

        debug!(
            topic,
            sender = %publisher.id(),
            recipients = report.recipients.len(),
            "routed message"
        );
        Ok(report)
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> BrokerStats {
        let table = self.table();
        let sessions = table
            .sessions
            .iter()
            .filter_map(|(id, session)| {
                session
                    .upgrade()
                    .map(|core| (id.clone(), core.counters().snapshot()))
            })
            .collect();

        BrokerStats {
            total: self.totals.snapshot(),
            sessions,
            subscriptions: table.matcher.len(),
            delivery_groups: table.groups.len(),
        }
    }

    /// Messages published through this broker by any session.
    pub fn total_sent(&self) -> u64 {
        self.totals.sent()
    }

    /// Deliveries made by this broker to any session.
    pub fn total_received(&self) -> u64 {
        self.totals.received()
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.table().sessions.len()
    }

    /// Members of the delivery group for `pattern`, in rotation order.
    pub fn delivery_group(&self, pattern: &str) -> Option<Vec<SessionId>> {
        self.table()
            .groups
            .get(pattern)
            .map(|group| group.members().to_vec())
    }

    pub(crate) fn register(&self, session: &Arc<SessionCore>) -> Result<()> {
        let mut table = self.table();
        if table.sessions.len() >= self.max_sessions {
            return Err(PubSubError::Connection(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }
        table
            .sessions
            .insert(session.id().clone(), Arc::downgrade(session));
        Ok(())
    }

    /// Removes a session and all of the given subscriptions.
    pub(crate) fn deregister(&self, session_id: &SessionId, subscriptions: &[Subscription]) {
        let mut table = self.table();
        for subscription in subscriptions {
            table.remove_subscription(session_id, &subscription.pattern);
        }
        table.sessions.remove(session_id);
    }

    pub(crate) fn subscribe(
        &self,
        session_id: &SessionId,
        pattern: &str,
        mode: SubscriptionMode,
    ) -> Result<()> {
        let mut table = self.table();
        let previous = table.matcher.subscribe(session_id, pattern, mode)?;
        if previous == Some(mode) {
            return Ok(());
        }
        match mode {
            SubscriptionMode::Normal => table.join_group(pattern, session_id),
            SubscriptionMode::DeliverAlways => table.leave_group(pattern, session_id),
        }
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, session_id: &SessionId, pattern: &str) -> bool {
        self.table().remove_subscription(session_id, pattern)
    }

    fn table(&self) -> MutexGuard<'_, RoutingTable> {
        self.routing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RoutingTable {
    /// Applies deliver-to-one to the matches and returns the chosen session ids.
    fn select_recipients(&mut self, matches: Vec<Match>) -> Vec<SessionId> {
        let mut grouped: BTreeMap<Arc<str>, Vec<SessionId>> = BTreeMap::new();
        let mut always = Vec::new();
        for found in matches {
            if found.mode.is_override() {
                always.push(found.session_id);
            } else {
                grouped
                    .entry(found.pattern)
                    .or_default()
                    .push(found.session_id);
            }
        }

        let mut selected = Vec::with_capacity(grouped.len() + always.len());
        for (pattern, subscribers) in grouped {
            match self.groups.get_mut(&pattern) {
                Some(group) => selected.extend(group.next_member().cloned()),
                // no group means a single normal subscriber
                None => selected.extend(subscribers),
            }
        }
        selected.extend(always);
        selected
    }

    fn resolve(&self, selected: Vec<SessionId>) -> Vec<Arc<SessionCore>> {
        selected
            .into_iter()
            .filter_map(|id| {
                let session = self.sessions.get(&id).and_then(Weak::upgrade);
                if session.is_none() {
                    warn!(session = %id, "matched a session that is no longer registered");
                }
                session
            })
            .collect()
    }

    fn join_group(&mut self, pattern: &str, session_id: &SessionId) {
        if let Some(group) = self.groups.get_mut(pattern) {
            group.join(session_id.clone());
            debug!(pattern, session = %session_id, members = group.len(), "joined delivery group");
            return;
        }

        // groups only dissolve once empty, so without one there is at most
        // a single other normal subscriber
        let incumbent = self
            .matcher
            .subscribers(pattern)
            .into_iter()
            .find(|(id, mode)| id != session_id && !mode.is_override())
            .map(|(id, _)| id);
        let Some(incumbent) = incumbent else {
            return;
        };

        let group = DeliveryGroup::form(Arc::from(pattern), incumbent, session_id.clone());
        info!(pattern, members = group.len(), "formed delivery group");
        self.groups.insert(Arc::clone(group.pattern()), group);
    }

    fn leave_group(&mut self, pattern: &str, session_id: &str) {
        let Some(group) = self.groups.get_mut(pattern) else {
            return;
        };
        if group.leave(session_id) && group.is_empty() {
            self.groups.remove(pattern);
            info!(pattern, "dissolved delivery group");
        }
    }

    fn remove_subscription(&mut self, session_id: &str, pattern: &str) -> bool {
        match self.matcher.unsubscribe(session_id, pattern) {
            Some(previous) => {
                if !previous.is_override() {
                    self.leave_group(pattern, session_id);
                }
                true
            }
            None => false,
        }
    }
}
