//! Delivery counters.
//!
//! Every session owns a [`Counters`]; the broker keeps one more that aggregates
//! all sessions, including the ones that have since closed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::broker::topic::SessionId;

#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl Counters {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent(),
            received: self.received(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub received: u64,
}

/// Point-in-time view of the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Totals across every session the broker has seen.
    pub total: StatsSnapshot,
    /// Counters of the sessions that are currently connected.
    pub sessions: BTreeMap<SessionId, StatsSnapshot>,
    pub subscriptions: usize,
    pub delivery_groups: usize,
}

impl BrokerStats {
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
