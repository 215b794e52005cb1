//! Push delivery placeholder.
//!
//! There is no push provider behind this sender yet: every attempt succeeds.

use async_trait::async_trait;

use courier_common::types::{NotificationMessage, NotificationType};

use crate::{DeliveryError, SendReceipt, Sender};

#[derive(Debug, Clone, Copy, Default)]
pub struct PushSender;

impl PushSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sender for PushSender {
    fn channel(&self) -> NotificationType {
        NotificationType::Push
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError> {
        tracing::info!(to = %message.recipient, body = %message.body, "Push delivered (simulated)");
        Ok(SendReceipt::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_always_succeeds() {
        let sender = PushSender::new();
        let message = NotificationMessage::new(NotificationType::Push, "device-token", "ping");

        let receipt = sender.send(&message).await.unwrap();
        assert_eq!(receipt, SendReceipt::default());
        assert_eq!(sender.channel(), NotificationType::Push);
    }
}
