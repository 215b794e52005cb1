//! Integration tests for the worker's consumer instances.
//!
//! Runs several consumers of one channel against the in-process bus.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use courier_common::types::{DeliveryStatus, NotificationMessage, NotificationType};
use courier_dispatch::router::SMS_TOPIC;
use courier_dispatch::{ChannelConsumer, InMemoryBus, MemoryLogSink, MetricsRegistry, Publisher};
use courier_notifier::{DeliveryError, SendReceipt, Sender};
use courier_worker::runner::run_instances;

// ============================================================
// Helpers
// ============================================================

/// Records every recipient it is asked to deliver to.
#[derive(Default)]
struct RecordingSender {
    recipients: Mutex<Vec<String>>,
}

#[async_trait]
impl Sender for RecordingSender {
    fn channel(&self) -> NotificationType {
        NotificationType::Sms
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError> {
        self.recipients
            .lock()
            .unwrap()
            .push(message.recipient.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(SendReceipt::with_detail("OK"))
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================
// Competing consumer instances
// ============================================================

#[tokio::test]
async fn test_instances_share_the_topic() {
    let bus = Arc::new(InMemoryBus::new());
    let sink = Arc::new(MemoryLogSink::new());
    let metrics = MetricsRegistry::new();
    let sender = Arc::new(RecordingSender::default());

    let consumer = Arc::new(ChannelConsumer::new(
        sender.clone(),
        sink.clone(),
        metrics.channel(NotificationType::Sms),
    ));
    let subscriptions = vec![bus.subscribe(SMS_TOPIC), bus.subscribe(SMS_TOPIC)];
    let shutdown = CancellationToken::new();
    let workers = tokio::spawn(run_instances(consumer, subscriptions, shutdown.clone()));

    for i in 0..10 {
        let message = NotificationMessage::new(NotificationType::Sms, format!("+1555010{}", i), "hi");
        bus.publish(SMS_TOPIC, &serde_json::to_vec(&message).unwrap())
            .await
            .unwrap();
    }

    wait_until(|| bus.committed(SMS_TOPIC).len() == 10).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), workers)
        .await
        .expect("instances did not stop")
        .unwrap();

    // Each entry went to exactly one instance.
    let recipients = sender.recipients.lock().unwrap().clone();
    assert_eq!(recipients.len(), 10);
    assert_eq!(recipients.iter().collect::<HashSet<_>>().len(), 10);

    let records = sink.records();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.status == DeliveryStatus::Success));
    assert!(records.iter().all(|r| r.error_detail.as_deref() == Some("OK")));
    assert_eq!(metrics.channel(NotificationType::Sms).sent(), 10);
}

#[tokio::test]
async fn test_instances_stop_when_bus_closes() {
    let bus = Arc::new(InMemoryBus::new());
    let consumer = Arc::new(ChannelConsumer::new(
        Arc::new(RecordingSender::default()),
        Arc::new(MemoryLogSink::new()),
        MetricsRegistry::new().channel(NotificationType::Sms),
    ));
    let subscriptions = vec![bus.subscribe(SMS_TOPIC), bus.subscribe(SMS_TOPIC)];
    bus.close();

    tokio::time::timeout(
        Duration::from_secs(5),
        run_instances(consumer, subscriptions, CancellationToken::new()),
    )
    .await
    .expect("instances did not stop");
}
