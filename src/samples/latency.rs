//! Round-trip latency probes.
//!
//! The publisher subscribes to `<topic>Reply` and publishes probes on `<topic>`
//! at a fixed rate. Each probe carries its publish time as 8 big-endian bytes
//! (milliseconds since the epoch). A responder echoes every probe to the reply
//! topic, and the publisher's handler measures how long the round trip took.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::broker::{Broker, DeliveryMode, Message, SubscriptionMode};
use crate::client::{MessageHandler, Session};
use crate::config::LatencySettings;
use crate::samples::ChannelSession;
use crate::utils::error::{DeliveryErrorKind, HandlerError, Result};

pub const PROBE_LEN: usize = 8;

pub fn encode_probe(sent_at_ms: i64) -> Bytes {
    Bytes::copy_from_slice(&sent_at_ms.to_be_bytes())
}

/// Reads the send time from the first 8 bytes of a probe.
pub fn decode_probe(payload: &[u8]) -> Option<i64> {
    let bytes: [u8; PROBE_LEN] = payload.get(..PROBE_LEN)?.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

/// Handler that measures the latency of echoed probes.
#[derive(Debug)]
pub struct LatencyTracker {
    threshold_ms: i64,
    verbose: bool,
    replies: AtomicU64,
    long_latency: AtomicU64,
    rejected: AtomicU64,
}

impl LatencyTracker {
    pub fn new(threshold_ms: i64, verbose: bool) -> Self {
        Self {
            threshold_ms,
            verbose,
            replies: AtomicU64::new(0),
            long_latency: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Records one round trip and returns its latency.
    pub fn record(&self, sent_at_ms: i64, now_ms: i64) -> i64 {
        let latency = now_ms.saturating_sub(sent_at_ms);
        self.replies.fetch_add(1, Ordering::Relaxed);
        if self.verbose {
            info!("Round trip latency is: {latency}ms");
        }
        if latency > self.threshold_ms {
            self.long_latency.fetch_add(1, Ordering::Relaxed);
            let at = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            warn!("Round trip latency is LONG: {latency}ms at {at}");
        }
        latency
    }

    pub fn replies(&self) -> u64 {
        self.replies.load(Ordering::Relaxed)
    }

    pub fn long_latency(&self) -> u64 {
        self.long_latency.load(Ordering::Relaxed)
    }

    /// Replies whose payload was not a probe.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl MessageHandler for LatencyTracker {
    fn on_receive(&self, message: &Message) -> std::result::Result<(), HandlerError> {
        let sent_at = decode_probe(&message.payload).ok_or_else(|| {
            format!(
                "expected a {PROBE_LEN}-byte latency probe, got {} bytes",
                message.payload.len()
            )
        })?;
        self.record(sent_at, Utc::now().timestamp_millis());
        Ok(())
    }

    fn on_error(&self, kind: DeliveryErrorKind, detail: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(%kind, detail, "discarded reply");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub messages_published: u64,
    pub replies_received: u64,
    pub long_latency_threshold_ms: i64,
    pub long_latency_count: u64,
    pub rejected_replies: u64,
}

pub async fn run(broker: Arc<Broker>, settings: &LatencySettings) -> Result<LatencySummary> {
    let reply_topic = format!("{}Reply", settings.topic);
    let tracker = Arc::new(LatencyTracker::new(
        settings.long_latency_threshold_ms,
        settings.verbose,
    ));

    let publisher = Session::new(Arc::clone(&broker), "latency publisher", tracker.clone());
    publisher.connect()?;
    info!("Setting topic subscription '{reply_topic}'...");
    publisher.subscribe(&reply_topic, SubscriptionMode::Normal)?;

    let mut responder = ChannelSession::connect(&broker, "latency responder")?;
    responder
        .session
        .subscribe(&settings.topic, SubscriptionMode::Normal)?;

    let pause = match settings.publish_rate {
        0 => Duration::ZERO,
        rate => Duration::from_millis(1000 / u64::from(rate)),
    };

    for _ in 0..settings.message_count {
        let probe = encode_probe(Utc::now().timestamp_millis());
        publisher.publish(&settings.topic, probe, DeliveryMode::Direct, None)?;

        for message in responder.take_messages() {
            responder.session.publish(
                &reply_topic,
                message.payload,
                DeliveryMode::Direct,
                message.sequence_number,
            )?;
        }

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    publisher.unsubscribe(&reply_topic)?;

    let summary = LatencySummary {
        messages_published: publisher.sent_count(),
        replies_received: tracker.replies(),
        long_latency_threshold_ms: settings.long_latency_threshold_ms,
        long_latency_count: tracker.long_latency(),
        rejected_replies: tracker.rejected(),
    };
    publisher.close();
    responder.session.close();
    Ok(summary)
}
