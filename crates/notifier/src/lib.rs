//! Channel senders.
//!
//! A [`Sender`] performs the actual transmission of one notification over one
//! channel. The dispatch pipeline is generic over this trait, so each channel
//! only has to implement `send`:
//! - [`EmailSender`]: plain-text email over an SMTP relay (lettre)
//! - [`SmsSender`]: HTTP POST to an SMS gateway (reqwest)
//! - [`PushSender`]: placeholder without a real transport

pub mod email;
pub mod push;
pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use courier_common::types::{NotificationMessage, NotificationType};

pub use email::{EmailConfig, EmailSender};
pub use push::PushSender;
pub use sms::{SmsConfig, SmsSender};

/// Why a single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// SMTP transport-level failure (authentication, connection, timeout).
    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The HTTP request failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote gateway answered but refused the message.
    #[error("Gateway returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The channel could not take the message for another reason.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),
}

impl DeliveryError {
    /// Text persisted as `error_message` when this is the final failure.
    ///
    /// Gateway rejections keep the raw response body, everything else its
    /// display form.
    pub fn detail(&self) -> String {
        match self {
            DeliveryError::Rejected { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Result of a successful attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Channel response worth keeping (persisted as `error_message`).
    pub detail: Option<String>,
}

impl SendReceipt {
    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// Channel-specific transmission of one notification.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Channel this sender delivers on.
    fn channel(&self) -> NotificationType;

    /// Perform one delivery attempt.
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError>;
}

#[async_trait]
impl<S: Sender + ?Sized> Sender for Arc<S> {
    fn channel(&self) -> NotificationType {
        (**self).channel()
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError> {
        (**self).send(message).await
    }
}
