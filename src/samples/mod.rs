//! End-to-end walkthroughs of the broker, run by the binary.
//!
//! - `dto`: deliver-to-one sharing between two sessions while an override
//!   session sees every message.
//! - `latency`: round-trip latency probes echoed back by a responder session.

pub mod dto;
pub mod latency;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::broker::{Broker, Message};
use crate::client::{ChannelHandler, Session, SessionEvent};
use crate::utils::error::Result;

/// A connected session whose deliveries are queued on a channel.
#[derive(Debug)]
pub struct ChannelSession {
    pub session: Session,
    events: UnboundedReceiver<SessionEvent>,
}

impl ChannelSession {
    pub fn connect(broker: &Arc<Broker>, name: &str) -> Result<Self> {
        let (handler, events) = ChannelHandler::channel();
        let session = Session::new(Arc::clone(broker), name, Arc::new(handler));
        session.connect()?;
        Ok(Self { session, events })
    }

    /// Messages delivered since the last call. Error events are logged and dropped.
    pub fn take_messages(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                SessionEvent::Message(message) => messages.push(message),
                SessionEvent::Error { kind, detail } => {
                    warn!(session = %self.session.name(), %kind, %detail, "delivery error");
                }
            }
        }
        messages
    }
}
