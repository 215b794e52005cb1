//! Redis Streams implementation of the bus.
//!
//! One stream per topic. Publishing is `XADD topic MAXLEN ~ n * payload <json>`.
//! Consuming uses a consumer group: `XREADGROUP` hands each entry to exactly one
//! group member and keeps it in that member's pending list until `XACK`.
//!
//! A subscription serves entries in this order:
//! 1. its own pending entries (read from id `0`), once, right after start
//! 2. entries left pending by any consumer for longer than the claim threshold,
//!    taken over with `XAUTOCLAIM`
//! 3. new entries (`>`)
//!
//! Step 2 recovers entries of consumers that crashed and never come back under
//! the same name.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamMaxlen, StreamRangeReply, StreamReadOptions, StreamReadReply};

use crate::bus::{Delivery, Publisher, Subscription};
use crate::error::DispatchError;

/// Stream field carrying the JSON payload.
pub const PAYLOAD_FIELD: &str = "payload";

/// How long one `XREADGROUP` call blocks before it is reissued.
const DEFAULT_BLOCK: Duration = Duration::from_secs(2);

/// Pending entries idle for longer than this are claimed by default.
const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(300);

/// Default approximate stream length cap.
const DEFAULT_MAX_LEN: usize = 100_000;

/// Publishes payloads with `XADD`, trimming the stream as it goes.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
    max_len: StreamMaxlen,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            max_len: StreamMaxlen::Approx(DEFAULT_MAX_LEN),
        }
    }

    /// Approximate number of entries kept per stream.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = StreamMaxlen::Approx(max_len.max(1));
        self
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, DispatchError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd_maxlen(topic, self.max_len, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(id)
    }
}

/// A consumer-group member reading one stream.
pub struct RedisSubscription {
    conn: ConnectionManager,
    topic: String,
    group: String,
    consumer: String,
    block: Duration,
    claim_idle: Duration,
    claim_cursor: String,
    backlog_drained: bool,
}

impl RedisSubscription {
    /// Join `group` on `topic` as `consumer`, creating stream and group if needed.
    ///
    /// A new group starts at the beginning of the stream, so entries published
    /// before the first worker ever ran are still delivered.
    pub async fn subscribe(
        mut conn: ConnectionManager,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, DispatchError> {
        let created: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(topic, group, "0").await;

        match created {
            Ok(()) => tracing::info!(topic, group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                tracing::debug!(topic, group, "Consumer group already exists")
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(topic, group, consumer, "Subscribed to stream");

        Ok(Self {
            conn,
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            block: DEFAULT_BLOCK,
            claim_idle: DEFAULT_CLAIM_IDLE,
            claim_cursor: "0-0".to_string(),
            backlog_drained: false,
        })
    }

    /// Override how long a single read blocks on the server.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Override how long an entry must sit unacknowledged before it is claimed.
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    fn delivery(&self, entry: StreamId) -> Delivery {
        Delivery {
            topic: self.topic.clone(),
            payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
            id: entry.id,
        }
    }

    async fn read_one(&mut self, start: &str) -> Result<Option<Delivery>, DispatchError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(self.block.as_millis() as usize);

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.topic], &[start], &options)
            .await?;

        let entry = reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next());

        Ok(entry.map(|entry| self.delivery(entry)))
    }

    /// Take over one entry another consumer left pending for too long.
    ///
    /// `XAUTOCLAIM` walks the pending list with a cursor; a full pass ends
    /// when the server hands back `0-0`.
    async fn claim_one(&mut self) -> Result<Option<Delivery>, DispatchError> {
        let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle.as_millis() as u64)
            .arg(&self.claim_cursor)
            .arg("COUNT")
            .arg(1)
            .query_async(&mut self.conn)
            .await?;

        let mut parts = reply.iter();
        if let Some(cursor) = parts.next() {
            self.claim_cursor = redis::from_redis_value(cursor)?;
        }
        let claimed: StreamRangeReply = match parts.next() {
            Some(entries) => redis::from_redis_value(entries)?,
            None => return Ok(None),
        };

        Ok(claimed.ids.into_iter().next().map(|entry| self.delivery(entry)))
    }
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self) -> Result<Delivery, DispatchError> {
        loop {
            if !self.backlog_drained {
                match self.read_one("0").await? {
                    Some(delivery) => {
                        tracing::info!(
                            topic = %self.topic,
                            id = %delivery.id,
                            "Redelivering uncommitted entry"
                        );
                        return Ok(delivery);
                    }
                    None => {
                        tracing::debug!(topic = %self.topic, "Pending backlog drained");
                        self.backlog_drained = true;
                    }
                }
            }

            if let Some(delivery) = self.claim_one().await? {
                tracing::warn!(
                    topic = %self.topic,
                    id = %delivery.id,
                    consumer = %self.consumer,
                    "Claimed entry abandoned by another consumer"
                );
                return Ok(delivery);
            }

            if let Some(delivery) = self.read_one(">").await? {
                return Ok(delivery);
            }
        }
    }

    async fn commit(&mut self, delivery: &Delivery) -> Result<(), DispatchError> {
        let _: i64 = self
            .conn
            .xack(&self.topic, &self.group, &[&delivery.id])
            .await?;
        Ok(())
    }
}
