//! Channel consumer: the per-channel delivery loop.
//!
//! A [`ChannelConsumer`] is generic over the channel's [`Sender`] and owns the
//! whole lifecycle of every entry it dequeues:
//! 1. Decode the payload; undecodable payloads are dropped, never retried
//! 2. Run the retry policy around `Sender::send`, timing every attempt
//! 3. Fire the terminal observer hook and write exactly one delivery record
//! 4. Commit the entry on the bus
//!
//! Entries are processed strictly one after another. Shutdown is only observed
//! while waiting for the next entry, so an entry that has been dequeued always
//! reaches its terminal state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use courier_common::types::{DeliveryStatus, NotificationMessage};
use courier_notifier::{SendReceipt, Sender};

use crate::bus::Subscription;
use crate::error::DispatchError;
use crate::log_sink::LogSink;
use crate::observability::DeliveryObserver;
use crate::retry::{Clock, RetryOutcome, RetryPolicy, TokioClock};

/// Pause after a failed dequeue before the bus is asked again.
const TRANSPORT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What became of one dequeued entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The payload was not a notification; nothing was sent or logged.
    Dropped,
    /// Sent successfully on attempt `attempts`.
    Delivered { attempts: u32 },
    /// Every attempt failed; `error_detail` is the last failure's detail.
    Exhausted { attempts: u32, error_detail: String },
}

/// Consumes one topic and delivers its notifications through `S`.
pub struct ChannelConsumer<S: Sender> {
    sender: S,
    sink: Arc<dyn LogSink>,
    observer: Arc<dyn DeliveryObserver>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: Sender> ChannelConsumer<S> {
    pub fn new(sender: S, sink: Arc<dyn LogSink>, observer: Arc<dyn DeliveryObserver>) -> Self {
        Self {
            sender,
            sink,
            observer,
            policy: RetryPolicy::default(),
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the dequeue loop until `shutdown` is cancelled or the bus closes.
    pub async fn run<B: Subscription>(&self, subscription: &mut B, shutdown: CancellationToken) {
        let channel = self.sender.channel();
        tracing::info!(
            channel = %channel,
            topic = subscription.topic(),
            max_attempts = self.policy.max_attempts,
            "Channel consumer started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = subscription.next() => next,
            };

            match next {
                Ok(delivery) => {
                    tracing::debug!(channel = %channel, id = %delivery.id, "Received entry");
                    self.handle(&delivery.payload).await;

                    if let Err(e) = subscription.commit(&delivery).await {
                        tracing::error!(
                            channel = %channel,
                            id = %delivery.id,
                            error = %e,
                            "Failed to commit entry, it may be redelivered"
                        );
                    }
                }
                Err(DispatchError::BusClosed) => {
                    tracing::info!(channel = %channel, "Bus closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "Failed to receive from bus");
                    self.clock.sleep(TRANSPORT_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(channel = %channel, "Channel consumer stopped");
    }

    /// Decode a raw payload and process it. Malformed payloads are dropped.
    pub async fn handle(&self, payload: &[u8]) -> Handled {
        match serde_json::from_slice::<NotificationMessage>(payload) {
            Ok(message) => self.process(&message).await,
            Err(e) => {
                tracing::warn!(
                    channel = %self.sender.channel(),
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Failed to deserialize notification, dropping it"
                );
                Handled::Dropped
            }
        }
    }

    /// Deliver one notification to its terminal state and log the outcome.
    pub async fn process(&self, message: &NotificationMessage) -> Handled {
        let channel = self.sender.channel();
        if message.notification_type != channel {
            tracing::warn!(
                channel = %channel,
                notification_type = %message.notification_type,
                "Notification type does not match consumer channel"
            );
        }

        let outcome = self
            .policy
            .execute(self.clock.as_ref(), |attempt| async move {
                tracing::info!(
                    channel = %channel,
                    recipient = %message.recipient,
                    attempt,
                    "Sending notification"
                );

                let started = Instant::now();
                let result = self.sender.send(message).await;
                self.observer.on_attempt(started.elapsed());

                if let Err(e) = &result {
                    tracing::warn!(channel = %channel, attempt, error = %e, "Attempt failed");
                }
                result
            })
            .await;

        let status = outcome.status();
        match outcome {
            RetryOutcome::Succeeded {
                value: SendReceipt { detail },
                attempts,
            } => {
                self.observer.on_sent();
                tracing::info!(
                    channel = %channel,
                    recipient = %message.recipient,
                    attempts,
                    "Notification delivered"
                );
                self.persist(message, status, detail.as_deref())
                    .await;
                Handled::Delivered { attempts }
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                self.observer.on_failed();
                let error_detail = last_error.detail();
                tracing::error!(
                    channel = %channel,
                    recipient = %message.recipient,
                    attempts,
                    error = %last_error,
                    "Notification not delivered, attempts exhausted"
                );
                self.persist(message, status, Some(&error_detail))
                    .await;
                Handled::Exhausted {
                    attempts,
                    error_detail,
                }
            }
        }
    }

    async fn persist(
        &self,
        message: &NotificationMessage,
        status: DeliveryStatus,
        error_detail: Option<&str>,
    ) {
        if let Err(e) = self.sink.save(message, status, error_detail).await {
            tracing::error!(
                recipient = %message.recipient,
                status = %status,
                error = %e,
                "Failed to persist delivery record"
            );
        }
    }
}
