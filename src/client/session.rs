use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::broker::message::{DeliveryMode, DeliveryReport, Message};
use crate::broker::stats::{Counters, StatsSnapshot};
use crate::broker::topic::{SessionId, Subscription, SubscriptionMode};
use crate::client::MessageHandler;
use crate::utils::error::{DeliveryErrorKind, PubSubError, Result};

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A client session attached to a [`Broker`].
///
/// A session is created disconnected, becomes routable with
/// [`connect`](Session::connect), and is torn down by
/// [`close`](Session::close) or by being dropped. It owns its subscriptions;
/// the broker only refers to it by id.
pub struct Session {
    core: Arc<SessionCore>,
    broker: Arc<Broker>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Session {
    /// Creates a disconnected session bound to `broker`.
    ///
    /// `name` is a label for logs; the routing identity is a generated
    /// `session-<uuid>`.
    pub fn new(
        broker: Arc<Broker>,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let core = SessionCore {
            id: format!("session-{}", Uuid::new_v4()),
            name: name.into(),
            handler,
            gate: Mutex::new(Gate {
                state: SessionState::Disconnected,
                in_flight: Vec::new(),
            }),
            idle: Condvar::new(),
            counters: Counters::default(),
        };
        Self {
            core: Arc::new(core),
            broker,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &SessionId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Registers the session with its broker.
    ///
    /// Connecting an already connected session is a no-op. A closed session
    /// cannot be reconnected.
    pub fn connect(&self) -> Result<()> {
        {
            let mut gate = self.core.lock_gate();
            let state = gate.state;
            match state {
                SessionState::Connected => return Ok(()),
                SessionState::Disconnected => gate.state = SessionState::Connecting,
                state => return Err(self.core.invalid_state(state, SessionState::Disconnected)),
            }
        }

        if let Err(err) = self.broker.register(&self.core) {
            let mut gate = self.core.lock_gate();
            if gate.state == SessionState::Connecting {
                gate.state = SessionState::Disconnected;
            }
            warn!(session = %self.id(), name = %self.name(), error = %err, "connect failed");
            return Err(err);
        }

        let mut gate = self.core.lock_gate();
        if gate.state != SessionState::Connecting {
            // closed while registering
            let state = gate.state;
            drop(gate);
            self.broker.deregister(self.id(), &[]);
            return Err(self.core.invalid_state(state, SessionState::Connecting));
        }
        gate.state = SessionState::Connected;
        drop(gate);

        info!(session = %self.id(), name = %self.name(), "session connected");
        Ok(())
    }

    /// Adds a subscription, or changes the mode of an existing one.
    pub fn subscribe(&self, pattern: &str, mode: SubscriptionMode) -> Result<()> {
        let mut subscriptions = self.lock_subscriptions();
        self.core.require_connected()?;
        self.broker.subscribe(self.id(), pattern, mode)?;

        match subscriptions.iter_mut().find(|s| s.pattern == pattern) {
            Some(existing) => existing.mode = mode,
            None => subscriptions.push(Subscription {
                session_id: self.id().clone(),
                pattern: pattern.to_string(),
                mode,
            }),
        }
        info!(session = %self.id(), pattern, ?mode, "subscribed");
        Ok(())
    }

    /// Removes a subscription. Unknown patterns are ignored.
    pub fn unsubscribe(&self, pattern: &str) -> Result<()> {
        let mut subscriptions = self.lock_subscriptions();
        self.core.require_connected()?;
        if self.broker.unsubscribe(self.id(), pattern) {
            subscriptions.retain(|s| s.pattern != pattern);
            info!(session = %self.id(), pattern, "unsubscribed");
        }
        Ok(())
    }

    /// Publishes a message through the broker.
    ///
    /// Deliveries happen before this returns, so messages from one session
    /// reach any given recipient in the order the publishes completed.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        delivery_mode: DeliveryMode,
        sequence_number: Option<u64>,
    ) -> Result<DeliveryReport> {
        self.broker
            .publish(self, topic, payload, delivery_mode, sequence_number)
    }

    /// Closes the session. Idempotent.
    ///
    /// Removes every subscription and group membership, then waits for
    /// deliveries already running on other threads. Once this returns the
    /// handler is never invoked again.
    pub fn close(&self) {
        let me = thread::current().id();
        {
            let mut gate = self.core.lock_gate();
            loop {
                let state = gate.state;
                match state {
                    SessionState::Closed => return,
                    // re-entered from this session's own handler while another close runs
                    SessionState::Closing if gate.in_flight.contains(&me) => return,
                    SessionState::Closing => gate = self.core.wait_idle(gate),
                    SessionState::Disconnected => {
                        gate.state = SessionState::Closed;
                        return;
                    }
                    SessionState::Connecting | SessionState::Connected => break,
                }
            }
            gate.state = SessionState::Closing;
        }

        // out of every rotation before waiting, so publishes made meanwhile
        // go to the remaining members
        let subscriptions = std::mem::take(&mut *self.lock_subscriptions());
        self.broker.deregister(self.id(), &subscriptions);

        let mut gate = self.core.lock_gate();
        while gate.in_flight.iter().any(|t| *t != me) {
            gate = self.core.wait_idle(gate);
        }
        gate.state = SessionState::Closed;
        drop(gate);
        self.core.idle.notify_all();
        info!(
            session = %self.id(),
            name = %self.name(),
            sent = self.sent_count(),
            received = self.received_count(),
            "session closed"
        );
    }

    /// Active subscriptions in the order they were made.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock_subscriptions().clone()
    }

    pub fn sent_count(&self) -> u64 {
        self.core.counters.sent()
    }

    pub fn received_count(&self) -> u64 {
        self.core.counters.received()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.counters.snapshot()
    }

    pub(crate) fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("state", &self.state())
            .finish()
    }
}

/// The part of a session the broker reaches through its weak reference.
pub(crate) struct SessionCore {
    id: SessionId,
    name: String,
    handler: Arc<dyn MessageHandler>,
    gate: Mutex<Gate>,
    idle: Condvar,
    counters: Counters,
}

struct Gate {
    state: SessionState,
    /// Threads currently inside the handler.
    in_flight: Vec<ThreadId>,
}

impl SessionCore {
    pub(crate) fn id(&self) -> &SessionId {
        &self.id
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock_gate().state
    }

    pub(crate) fn require_connected(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected => Ok(()),
            state => Err(self.invalid_state(state, SessionState::Connected)),
        }
    }

    /// Hands `message` to the handler unless the session is no longer connected.
    ///
    /// Returns whether the handler was invoked. Handler errors and panics are
    /// reported through `on_error` and do not propagate.
    pub(crate) fn deliver(&self, message: &Message) -> bool {
        let Some(_in_flight) = self.begin_delivery() else {
            return false;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_receive(message)));
        self.counters.record_received();

        let (kind, detail) = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(err)) => (DeliveryErrorKind::HandlerFailed, err.to_string()),
            Err(payload) => (DeliveryErrorKind::HandlerPanicked, panic_detail(payload.as_ref())),
        };
        warn!(session = %self.id, topic = %message.topic, %kind, %detail, "handler failed");
        let _ = panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_error(kind, &detail)));
        true
    }

    fn begin_delivery(&self) -> Option<InFlight<'_>> {
        let mut gate = self.lock_gate();
        if gate.state != SessionState::Connected {
            return None;
        }
        gate.in_flight.push(thread::current().id());
        Some(InFlight { core: self })
    }

    fn invalid_state(&self, state: SessionState, required: SessionState) -> PubSubError {
        PubSubError::InvalidState {
            session_id: self.id.clone(),
            state,
            required,
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle<'a>(&self, gate: MutexGuard<'a, Gate>) -> MutexGuard<'a, Gate> {
        self.idle.wait(gate).unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handler", &"dyn MessageHandler")
            .finish()
    }
}

/// Marks one delivery in progress until dropped.
struct InFlight<'a> {
    core: &'a SessionCore,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut gate = self.core.lock_gate();
        if let Some(pos) = gate.in_flight.iter().position(|t| *t == me) {
            gate.in_flight.swap_remove(pos);
        }
        drop(gate);
        self.core.idle.notify_all();
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
