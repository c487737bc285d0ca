//! The `client` module defines the session side of the Pub/Sub system.
//!
//! It provides the `Session` type, which owns a client's subscriptions and
//! connection state, and the `MessageHandler` contract through which a session
//! receives its deliveries.

pub mod handler;
pub mod session;

pub use handler::{ChannelHandler, MessageHandler, SessionEvent};
pub use session::{Session, SessionState};

pub(crate) use session::SessionCore;
