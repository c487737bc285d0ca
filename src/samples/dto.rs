//! Deliver-to-one with an override subscriber.
//!
//! Three sessions subscribe to the same topic. Two of them use normal
//! subscriptions and therefore share the messages round robin. The third
//! subscribes with the deliver-to-one override, receives every message, and is
//! also the publisher.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::broker::{Broker, DeliveryMode, SubscriptionMode};
use crate::config::DtoSettings;
use crate::samples::ChannelSession;
use crate::utils::error::Result;

pub const SAMPLE_PAYLOAD: &[u8] = b"Hello World";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionTally {
    pub name: String,
    pub received: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DtoSummary {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub sessions: Vec<SessionTally>,
}

pub async fn run(broker: Arc<Broker>, settings: &DtoSettings) -> Result<DtoSummary> {
    let mut observer = ChannelSession::connect(&broker, "DTO Override Session")?;
    let mut first = ChannelSession::connect(&broker, "DTO Session 1")?;
    let mut second = ChannelSession::connect(&broker, "DTO Session 2")?;

    observer
        .session
        .subscribe(&settings.topic, SubscriptionMode::DeliverAlways)?;
    first
        .session
        .subscribe(&settings.topic, SubscriptionMode::Normal)?;
    second
        .session
        .subscribe(&settings.topic, SubscriptionMode::Normal)?;

    let pause = Duration::from_millis(settings.interval_ms);
    for seq in 1..=settings.message_count {
        observer.session.publish(
            &settings.topic,
            SAMPLE_PAYLOAD,
            DeliveryMode::Direct,
            Some(seq),
        )?;
        info!("Message {seq} sent.");

        for consumer in [&mut observer, &mut first, &mut second] {
            for message in consumer.take_messages() {
                let seq = message
                    .sequence_number
                    .map_or_else(|| "none".to_string(), |n| n.to_string());
                info!("{} received message. (seq# {seq})", consumer.session.name());
            }
        }

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    let consumers = [&observer, &first, &second];
    let summary = DtoSummary {
        messages_sent: observer.session.sent_count(),
        messages_received: consumers.iter().map(|c| c.session.received_count()).sum(),
        sessions: consumers
            .iter()
            .map(|c| SessionTally {
                name: c.session.name().to_string(),
                received: c.session.received_count(),
            })
            .collect(),
    };

    for consumer in consumers {
        consumer.session.close();
    }
    Ok(summary)
}
