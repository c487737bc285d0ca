//! # topicrelay
//!
//! `topicrelay` is an in-process publish/subscribe core for direct messaging.
//! Sessions subscribe to hierarchical topic patterns, publish messages through a
//! shared broker, and receive deliveries through a handler callback. Normal
//! subscribers of the same pattern share messages round robin (deliver-to-one),
//! while override subscribers see every message.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: The central component that indexes subscriptions, rotates delivery groups, and routes messages.
//! - `client`: Sessions and the message handler contract.
//! - `config`: Handles loading and managing configuration.
//! - `samples`: Deliver-to-one and round-trip latency walkthroughs run by the binary.
//! - `utils`: Contains shared utilities, such as error handling and logging.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use topicrelay::broker::{Broker, DeliveryMode, Message, SubscriptionMode};
//! use topicrelay::client::Session;
//! use topicrelay::utils::error::HandlerError;
//!
//! let broker = Arc::new(Broker::new());
//! let handler = Arc::new(|msg: &Message| -> Result<(), HandlerError> {
//!     println!("got {} bytes on {}", msg.payload.len(), msg.topic);
//!     Ok(())
//! });
//!
//! let consumer = Session::new(broker.clone(), "consumer", handler.clone());
//! consumer.connect().unwrap();
//! consumer.subscribe("orders/*", SubscriptionMode::Normal).unwrap();
//!
//! let producer = Session::new(broker.clone(), "producer", handler);
//! producer.connect().unwrap();
//! let report = producer
//!     .publish("orders/123", &b"hello"[..], DeliveryMode::Direct, Some(1))
//!     .unwrap();
//! assert_eq!(report.recipients, vec![consumer.id().clone()]);
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod samples;
pub mod utils;
