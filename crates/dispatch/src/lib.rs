//! Notification dispatch pipeline.
//!
//! Ingress publishes through the [`NotificationRouter`]; one
//! [`ChannelConsumer`] group per channel drains its topic, retries failed sends
//! according to a [`RetryPolicy`], records the terminal outcome in a
//! [`LogSink`] and reports to a [`DeliveryObserver`].
//!
//! Delivery is at-least-once: an entry is committed on the bus only after its
//! outcome was handled, so a crash in between leads to a redelivery.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod log_sink;
pub mod observability;
pub mod redis_bus;
pub mod retry;
pub mod router;

pub use bus::{Delivery, InMemoryBus, Publisher, Subscription};
pub use consumer::{ChannelConsumer, Handled};
pub use error::DispatchError;
pub use log_sink::{LogSink, MemoryLogSink, PgLogSink};
pub use observability::{ChannelMetrics, DeliveryObserver, MetricsRegistry, RouterMetrics};
pub use redis_bus::{RedisPublisher, RedisSubscription};
pub use retry::{Clock, DeliveryState, RetryOutcome, RetryPolicy, TokioClock};
pub use router::{NotificationRouter, topic_for};
