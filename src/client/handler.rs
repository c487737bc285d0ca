use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::broker::message::Message;
use crate::utils::error::{DeliveryErrorKind, HandlerError};

/// Callbacks through which a session receives deliveries.
///
/// Both methods run synchronously on the publishing thread, after the broker
/// has released its routing lock. They must not block indefinitely: a slow
/// handler delays the remaining recipients of the same publish and the
/// publisher itself.
///
/// Closures of type `Fn(&Message) -> Result<(), HandlerError>` implement this
/// trait and ignore errors.
pub trait MessageHandler: Send + Sync {
    /// Called once per delivery. An `Err` is reported back through
    /// [`on_error`](MessageHandler::on_error); it does not affect other
    /// recipients.
    fn on_receive(&self, message: &Message) -> Result<(), HandlerError>;

    /// Called when `on_receive` failed or panicked.
    fn on_error(&self, _kind: DeliveryErrorKind, _detail: &str) {}
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_receive(&self, message: &Message) -> Result<(), HandlerError> {
        self(message)
    }
}

/// Something a [`ChannelHandler`] forwards to its receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(Message),
    Error {
        kind: DeliveryErrorKind,
        detail: String,
    },
}

/// Forwards every delivery into an unbounded channel.
///
/// Lets a consumer process messages on its own task instead of on the
/// publishing thread.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: UnboundedSender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    /// Creates a handler together with the receiving end of its channel.
    pub fn channel() -> (Self, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl MessageHandler for ChannelHandler {
    fn on_receive(&self, message: &Message) -> Result<(), HandlerError> {
        self.sender
            .send(SessionEvent::Message(message.clone()))
            .map_err(|_| "event receiver dropped".into())
    }

    fn on_error(&self, kind: DeliveryErrorKind, detail: &str) {
        let _ = self.sender.send(SessionEvent::Error {
            kind,
            detail: detail.to_string(),
        });
    }
}
