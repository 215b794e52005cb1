//! Message bus abstraction.
//!
//! The pipeline talks to the bus through two seams:
//! - [`Publisher`]: append a payload to a topic (used by the router)
//! - [`Subscription`]: a consumer-group membership on one topic that hands out
//!   one [`Delivery`] at a time and is told when it may be committed
//!
//! [`crate::redis_bus`] implements them on Redis Streams; [`InMemoryBus`] is an
//! in-process implementation with the same competing-consumer semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DispatchError;

/// One entry handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    /// Bus-assigned entry id, used for the commit.
    pub id: String,
    /// Raw payload bytes; decoding is the consumer's job.
    pub payload: Vec<u8>,
}

/// Producer side of the bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Append `payload` to `topic` and return the assigned entry id.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, DispatchError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, DispatchError> {
        (**self).publish(topic, payload).await
    }
}

/// Consumer-group membership on a single topic.
#[async_trait]
pub trait Subscription: Send {
    fn topic(&self) -> &str;

    /// Wait until an entry is available. Must be cancel-safe: dropping the
    /// future before it resolves must not lose an entry.
    async fn next(&mut self) -> Result<Delivery, DispatchError>;

    /// Mark an entry as fully processed so it is never redelivered.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// In-process bus
// ---------------------------------------------------------------------------

struct Topic {
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>,
    published: Mutex<Vec<Delivery>>,
    committed: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl Topic {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            published: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

/// In-process bus with one FIFO queue per topic.
///
/// All subscriptions to the same topic share that queue, so each entry is
/// handed to exactly one of them, as with members of one consumer group.
#[derive(Default)]
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new()))
            .clone()
    }

    /// Join the (single, implicit) consumer group of `topic`.
    pub fn subscribe(&self, topic: &str) -> InMemorySubscription {
        let state = self.topic(topic);
        InMemorySubscription {
            topic: topic.to_string(),
            receiver: state.receiver.clone(),
            state,
        }
    }

    /// Stop accepting entries. Publishing fails and drained subscriptions
    /// report [`DispatchError::BusClosed`].
    pub fn close(&self) {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        for topic in topics.values() {
            topic
                .sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
        }
    }

    /// Every entry ever published to `topic`, in order.
    pub fn published(&self, topic: &str) -> Vec<Delivery> {
        self.topic(topic)
            .published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ids committed on `topic`, in commit order.
    pub fn committed(&self, topic: &str) -> Vec<String> {
        self.topic(topic)
            .committed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, DispatchError> {
        let state = self.topic(topic);
        let id = format!("{}-0", state.next_id.fetch_add(1, Ordering::Relaxed));
        let delivery = Delivery {
            topic: topic.to_string(),
            id: id.clone(),
            payload: payload.to_vec(),
        };

        let sender = state.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = sender.as_ref().ok_or(DispatchError::BusClosed)?;
        sender
            .send(delivery.clone())
            .map_err(|_| DispatchError::BusClosed)?;

        state
            .published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delivery);
        Ok(id)
    }
}

/// A member of an [`InMemoryBus`] topic's consumer group.
pub struct InMemorySubscription {
    topic: String,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>,
    state: Arc<Topic>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self) -> Result<Delivery, DispatchError> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(DispatchError::BusClosed)
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), DispatchError> {
        self.state
            .committed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(delivery.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_next_is_fifo() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("notifications-email");

        let first = bus.publish("notifications-email", b"one").await.unwrap();
        let second = bus.publish("notifications-email", b"two").await.unwrap();
        assert_ne!(first, second);

        assert_eq!(sub.next().await.unwrap().payload, b"one");
        assert_eq!(sub.next().await.unwrap().payload, b"two");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        bus.publish("notifications-sms", b"sms").await.unwrap();
        bus.publish("notifications-push", b"push").await.unwrap();

        let mut sub = bus.subscribe("notifications-push");
        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.topic, "notifications-push");
        assert_eq!(delivery.payload, b"push");
        assert_eq!(bus.published("notifications-sms").len(), 1);
    }

    #[tokio::test]
    async fn test_group_members_share_entries() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("notifications-sms");
        let mut b = bus.subscribe("notifications-sms");

        bus.publish("notifications-sms", b"1").await.unwrap();
        bus.publish("notifications-sms", b"2").await.unwrap();

        let first = a.next().await.unwrap();
        let second = b.next().await.unwrap();
        assert_eq!(first.payload, b"1");
        assert_eq!(second.payload, b"2");
    }

    #[tokio::test]
    async fn test_commit_is_recorded() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("notifications-email");
        bus.publish("notifications-email", b"x").await.unwrap();

        let delivery = sub.next().await.unwrap();
        sub.commit(&delivery).await.unwrap();
        assert_eq!(bus.committed("notifications-email"), vec![delivery.id]);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish_and_ends_subscriptions() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("notifications-email");
        bus.close();

        let err = bus.publish("notifications-email", b"late").await.unwrap_err();
        assert!(matches!(err, DispatchError::BusClosed));
        assert!(matches!(sub.next().await, Err(DispatchError::BusClosed)));
    }
}
