pub mod engine;
pub mod group;
pub mod message;
pub mod stats;
pub mod topic;

pub use engine::Broker;
pub use message::{DeliveryMode, DeliveryReport, Message};
pub use topic::{SessionId, Subscription, SubscriptionMode};
