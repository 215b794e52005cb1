//! Email delivery via SMTP.
//!
//! [`EmailSender`] wraps the `lettre` async SMTP transport (STARTTLS relay) and
//! sends the notification body as a plain-text email.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use courier_common::config::AppConfig;
use courier_common::types::{NotificationMessage, NotificationType};

use crate::{DeliveryError, SendReceipt, Sender};

/// Upper bound for a single SMTP conversation.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the SMTP relay.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// RFC 5322 "From" address.
    pub from_address: String,
}

impl EmailConfig {
    /// Extract the SMTP settings from the application config.
    ///
    /// Returns `None` when `SMTP_HOST` or `SMTP_FROM` is missing.
    pub fn from_app_config(config: &AppConfig) -> Option<Self> {
        Some(Self {
            smtp_host: config.smtp_host.clone()?,
            smtp_port: config.smtp_port,
            username: config.smtp_username.clone(),
            password: config.smtp_password.clone(),
            from_address: config.smtp_from.clone()?,
        })
    }
}

/// Sends notifications as plain-text emails.
pub struct EmailSender {
    config: EmailConfig,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    /// Build the sender and its SMTP transport. No connection is opened yet.
    pub fn new(config: EmailConfig) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            config,
        })
    }

    /// Assemble the MIME message for a notification.
    fn build_message(&self, message: &NotificationMessage) -> Result<Message, DeliveryError> {
        Message::builder()
            .from(self.config.from_address.parse()?)
            .to(message.recipient.parse()?)
            .subject(message.subject.clone().unwrap_or_default())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl Sender for EmailSender {
    fn channel(&self) -> NotificationType {
        NotificationType::Email
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError> {
        let email = self.build_message(message)?;
        self.mailer.send(email).await?;

        tracing::info!(
            to = %message.recipient,
            subject = message.subject.as_deref().unwrap_or(""),
            "Email sent"
        );
        Ok(SendReceipt::default())
    }
}
