//! SMS delivery through an HTTP gateway.
//!
//! The gateway is called with a JSON body `{phone, message, key}`. A non-2xx
//! status, or a 2xx body reporting `"success": false`, counts as a failed
//! attempt. On success the raw response body is kept as the receipt detail and
//! ends up in the record's `error_message` column.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use courier_common::config::AppConfig;
use courier_common::types::{NotificationMessage, NotificationType};

use crate::{DeliveryError, SendReceipt, Sender};

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// SMS gateway settings.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
}

impl SmsConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            api_url: config.sms_api_url.clone(),
            api_key: config.sms_api_key.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    phone: &'a str,
    message: &'a str,
    key: &'a str,
}

/// Sends notifications as text messages.
pub struct SmsSender {
    config: SmsConfig,
    client: reqwest::Client,
}

impl SmsSender {
    pub fn new(config: SmsConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    /// Whether a 2xx response body still reports a refusal.
    fn body_reports_failure(body: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
            == Some(false)
    }
}

#[async_trait]
impl Sender for SmsSender {
    fn channel(&self) -> NotificationType {
        NotificationType::Sms
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt, DeliveryError> {
        let request = SmsRequest {
            phone: &message.recipient,
            message: &message.body,
            key: &self.config.api_key,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::info!(
            to = %message.recipient,
            status = status.as_u16(),
            response = %body,
            "SMS gateway responded"
        );

        if !status.is_success() || Self::body_reports_failure(&body) {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(SendReceipt::with_detail(body))
    }
}
