//! The `error` module defines the error types used within `topicrelay`.
//!
//! Every synchronous operation returns [`PubSubError`]. Failures raised by a
//! message handler while a delivery is in progress never reach the publisher;
//! they are reported to the recipient through
//! [`MessageHandler::on_error`](crate::client::MessageHandler::on_error) with a
//! [`DeliveryErrorKind`].

use std::fmt;

use thiserror::Error;

use crate::broker::topic::SessionId;
use crate::client::SessionState;

/// Errors surfaced to the caller of a broker or session operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// A published topic contained wildcard syntax, or a topic or pattern was malformed.
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    /// The session was not in the state the operation requires.
    #[error("session {session_id} is {state}, operation requires {required}")]
    InvalidState {
        session_id: SessionId,
        state: SessionState,
        required: SessionState,
    },

    /// The broker refused the connection. Never retried internally.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl PubSubError {
    pub(crate) fn invalid_topic(topic: &str, reason: &'static str) -> Self {
        Self::InvalidTopic {
            topic: topic.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, PubSubError>;

/// Error returned by a handler's `on_receive`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Classifies a failure on the delivery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryErrorKind {
    /// `on_receive` returned an error.
    HandlerFailed,
    /// `on_receive` panicked.
    HandlerPanicked,
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandlerFailed => f.write_str("handler failed"),
            Self::HandlerPanicked => f.write_str("handler panicked"),
        }
    }
}
