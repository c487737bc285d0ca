use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::broker::topic::SessionId;

/// Delivery guarantee requested for a message. Only direct delivery exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// No persistence and no acknowledgement of receipt.
    #[default]
    Direct,
}

/// Represents a published message in the Pub/Sub system.
///
/// A message is built by [`Broker::publish`](crate::broker::Broker::publish),
/// handed by reference to every recipient's handler, and then dropped. It is
/// never persisted. The payload is reference counted, so fanning a message out
/// does not copy its bytes.
///
/// # Fields
///
/// - `topic` - The topic the message was published to.
/// - `sender` - The identifier of the publishing session.
/// - `delivery_mode` - Always [`DeliveryMode::Direct`].
/// - `payload` - Opaque message content.
/// - `sequence_number` - Optional application-assigned sequence number.
/// - `timestamp` - Publish time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub sender: SessionId,
    pub delivery_mode: DeliveryMode,
    pub payload: Bytes,
    pub sequence_number: Option<u64>,
    pub timestamp: i64,
}

impl Message {
    /// Creates a direct message stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            sender: SessionId::new(),
            delivery_mode: DeliveryMode::Direct,
            payload: payload.into(),
            sequence_number: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<SessionId>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: Option<u64>) -> Self {
        self.sequence_number = sequence_number;
        self
    }
}

/// Outcome of a publish: which sessions had the message handed to their handler.
///
/// A session appears once per delivery, so a session whose overlapping
/// subscriptions both matched is listed twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub topic: String,
    pub sequence_number: Option<u64>,
    pub recipients: Vec<SessionId>,
}

impl DeliveryReport {
    pub fn new(message: &Message) -> Self {
        Self {
            topic: message.topic.clone(),
            sequence_number: message.sequence_number,
            recipients: Vec::new(),
        }
    }

    /// True when nobody received the message.
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// How many deliveries went to `session_id`.
    pub fn deliveries_to(&self, session_id: &str) -> usize {
        self.recipients.iter().filter(|r| *r == session_id).count()
    }
}
