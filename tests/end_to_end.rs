use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use topicrelay::broker::{Broker, DeliveryMode, Message, SubscriptionMode};
use topicrelay::client::{ChannelHandler, MessageHandler, Session, SessionEvent};
use topicrelay::utils::error::{HandlerError, PubSubError};

#[derive(Default)]
struct Counter {
    seen: AtomicUsize,
}

impl MessageHandler for Counter {
    fn on_receive(&self, _message: &Message) -> Result<(), HandlerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn session(broker: &Arc<Broker>, name: &str) -> (Session, Arc<Counter>) {
    let counter = Arc::new(Counter::default());
    let session = Session::new(broker.clone(), name, counter.clone());
    session.connect().expect("connect");
    (session, counter)
}

#[test]
fn orders_shared_between_group_and_override() {
    let broker = Arc::new(Broker::new());
    let (publisher, _) = session(&broker, "publisher");
    let (watcher, _) = session(&broker, "watcher");
    let (first, _) = session(&broker, "first");
    let (second, _) = session(&broker, "second");

    watcher
        .subscribe("orders/*", SubscriptionMode::DeliverAlways)
        .unwrap();
    first.subscribe("orders/*", SubscriptionMode::Normal).unwrap();
    second.subscribe("orders/*", SubscriptionMode::Normal).unwrap();

    for seq in 1..=5 {
        let report = publisher
            .publish("orders/123", &b"order"[..], DeliveryMode::Direct, Some(seq))
            .unwrap();
        assert_eq!(report.recipients.len(), 2);
        assert_eq!(report.sequence_number, Some(seq));
    }

    assert_eq!(watcher.received_count(), 5);
    let split = (first.received_count(), second.received_count());
    assert_eq!(split.0 + split.1, 5);
    assert!(split == (3, 2) || split == (2, 3), "unexpected split {:?}", split);

    let stats = broker.stats();
    assert_eq!(stats.total.sent, 5);
    assert_eq!(stats.total.received, 10);
    assert_eq!(stats.delivery_groups, 1);
}

#[test]
fn wildcard_publish_reaches_nobody() {
    let broker = Arc::new(Broker::new());
    let (publisher, _) = session(&broker, "publisher");
    let (consumer, counter) = session(&broker, "consumer");
    consumer.subscribe(">", SubscriptionMode::DeliverAlways).unwrap();

    for topic in ["orders/*", "orders/>", "a//b", ""] {
        let err = publisher
            .publish(topic, &b""[..], DeliveryMode::Direct, None)
            .unwrap_err();
        assert!(matches!(err, PubSubError::InvalidTopic { .. }), "{}", topic);
    }
    assert_eq!(counter.seen.load(Ordering::SeqCst), 0);
    assert_eq!(broker.total_sent(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishers_keep_group_totals() {
    const PUBLISHERS: usize = 4;
    const PER_PUBLISHER: usize = 50;

    let broker = Arc::new(Broker::new());
    let consumers: Vec<_> = (0..3)
        .map(|i| {
            let (consumer, counter) = session(&broker, &format!("consumer-{}", i));
            consumer.subscribe("jobs/>", SubscriptionMode::Normal).unwrap();
            (consumer, counter)
        })
        .collect();
    let (audit, audit_counter) = session(&broker, "audit");
    audit.subscribe("jobs/>", SubscriptionMode::DeliverAlways).unwrap();

    let tasks = (0..PUBLISHERS).map(|p| {
        let broker = broker.clone();
        tokio::task::spawn_blocking(move || {
            let (publisher, _) = session(&broker, &format!("publisher-{}", p));
            for n in 0..PER_PUBLISHER {
                let report = publisher
                    .publish(
                        &format!("jobs/{}/{}", p, n),
                        &b"job"[..],
                        DeliveryMode::Direct,
                        Some(n as u64),
                    )
                    .unwrap();
                assert_eq!(report.recipients.len(), 2);
            }
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let total = PUBLISHERS * PER_PUBLISHER;
    let grouped: usize = consumers
        .iter()
        .map(|(_, counter)| counter.seen.load(Ordering::SeqCst))
        .sum();
    assert_eq!(grouped, total);
    for (_, counter) in &consumers {
        let seen = counter.seen.load(Ordering::SeqCst);
        assert!(seen.abs_diff(total / 3) <= 1, "uneven share {}", seen);
    }
    assert_eq!(audit_counter.seen.load(Ordering::SeqCst), total);
    assert_eq!(broker.total_received() as usize, total * 2);
}

/// Flags any delivery that lands after its session was closed.
#[derive(Default)]
struct Fence {
    closed: AtomicBool,
    late: AtomicUsize,
}

impl MessageHandler for Fence {
    fn on_receive(&self, _message: &Message) -> Result<(), HandlerError> {
        if self.closed.load(Ordering::SeqCst) {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_micros(200));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_delivery_after_close_returns() {
    let broker = Arc::new(Broker::new());
    let fence = Arc::new(Fence::default());
    let target = Session::new(broker.clone(), "target", fence.clone());
    target.connect().unwrap();
    target.subscribe("ticks", SubscriptionMode::DeliverAlways).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let publishers: Vec<_> = (0..3)
        .map(|p| {
            let broker = broker.clone();
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || {
                let (publisher, _) = session(&broker, &format!("ticker-{}", p));
                while !stop.load(Ordering::SeqCst) {
                    publisher
                        .publish("ticks", &b"t"[..], DeliveryMode::Direct, None)
                        .unwrap();
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    target.close();
    fence.closed.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.store(true, Ordering::SeqCst);
    for result in futures::future::join_all(publishers).await {
        result.unwrap();
    }

    assert_eq!(fence.late.load(Ordering::SeqCst), 0);
    assert_eq!(broker.session_count(), 0);
}

#[tokio::test]
async fn per_sender_order_is_preserved() {
    let broker = Arc::new(Broker::new());
    let (handler, mut events) = ChannelHandler::channel();
    let consumer = Session::new(broker.clone(), "consumer", Arc::new(handler));
    consumer.connect().unwrap();
    consumer.subscribe("feed/*", SubscriptionMode::Normal).unwrap();

    let (left, _) = session(&broker, "left");
    let (right, _) = session(&broker, "right");
    for seq in 0..20 {
        let from = if seq % 3 == 0 { &right } else { &left };
        from.publish("feed/x", &b""[..], DeliveryMode::Direct, Some(seq))
            .unwrap();
    }
    drop(consumer);

    let mut by_sender: HashMap<String, Vec<u64>> = HashMap::new();
    while let Some(event) = events.recv().await {
        if let SessionEvent::Message(message) = event {
            by_sender
                .entry(message.sender.clone())
                .or_default()
                .extend(message.sequence_number);
        }
    }
    for sequence in by_sender.values() {
        assert!(sequence.windows(2).all(|w| w[0] < w[1]));
    }
    assert_eq!(by_sender.values().map(Vec::len).sum::<usize>(), 20);
    assert_eq!(by_sender[left.id()].len(), 13);
}

#[test]
fn handler_failure_does_not_reach_publisher() {
    let broker = Arc::new(Broker::new());
    let errors = Arc::new(Mutex::new(0));
    let (publisher, _) = session(&broker, "publisher");

    struct Rejecting(Arc<Mutex<usize>>);
    impl MessageHandler for Rejecting {
        fn on_receive(&self, _message: &Message) -> Result<(), HandlerError> {
            Err("rejected".into())
        }
        fn on_error(&self, _kind: topicrelay::utils::error::DeliveryErrorKind, _detail: &str) {
            *self.0.lock().unwrap() += 1;
        }
    }

    let rejecting = Session::new(broker.clone(), "rejecting", Arc::new(Rejecting(errors.clone())));
    rejecting.connect().unwrap();
    rejecting.subscribe("x", SubscriptionMode::Normal).unwrap();

    let report = publisher
        .publish("x", &b""[..], DeliveryMode::Direct, None)
        .unwrap();
    assert_eq!(report.recipients, vec![rejecting.id().clone()]);
    assert_eq!(*errors.lock().unwrap(), 1);
}
