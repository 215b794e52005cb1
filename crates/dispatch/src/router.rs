//! Topic routing at ingress.
//!
//! Each notification type has exactly one topic. Types without a consumer go to
//! `notifications-unknown`, where nothing reads them.

use std::sync::Arc;

use courier_common::types::{NotificationMessage, NotificationType};

use crate::bus::Publisher;
use crate::error::DispatchError;
use crate::observability::RouterMetrics;

pub const EMAIL_TOPIC: &str = "notifications-email";
pub const SMS_TOPIC: &str = "notifications-sms";
pub const PUSH_TOPIC: &str = "notifications-push";
pub const UNKNOWN_TOPIC: &str = "notifications-unknown";

/// Topic a notification of type `notification_type` is published to.
pub fn topic_for(notification_type: NotificationType) -> &'static str {
    match notification_type {
        NotificationType::Email => EMAIL_TOPIC,
        NotificationType::Sms => SMS_TOPIC,
        NotificationType::Push => PUSH_TOPIC,
        NotificationType::Unknown => UNKNOWN_TOPIC,
    }
}

/// Serializes notifications and publishes them to their topic.
#[derive(Clone)]
pub struct NotificationRouter {
    publisher: Arc<dyn Publisher>,
    metrics: Arc<RouterMetrics>,
}

impl NotificationRouter {
    pub fn new(publisher: Arc<dyn Publisher>, metrics: Arc<RouterMetrics>) -> Self {
        Self { publisher, metrics }
    }

    /// Publish `message` and return the topic it went to.
    ///
    /// Bus failures are returned to the caller as-is.
    pub async fn route(&self, message: &NotificationMessage) -> Result<&'static str, DispatchError> {
        let topic = topic_for(message.notification_type);
        let payload = serde_json::to_vec(message)?;

        if message.notification_type == NotificationType::Unknown {
            tracing::warn!(
                topic,
                recipient = %message.recipient,
                "Notification type has no consumer, routing to sink topic"
            );
        }

        match self.publisher.publish(topic, &payload).await {
            Ok(id) => {
                self.metrics.record_published(topic);
                tracing::info!(
                    topic,
                    id = %id,
                    recipient = %message.recipient,
                    "Notification published"
                );
                Ok(topic)
            }
            Err(e) => {
                self.metrics.record_failed();
                tracing::error!(topic, error = %e, "Failed to publish notification");
                Err(e)
            }
        }
    }
}
