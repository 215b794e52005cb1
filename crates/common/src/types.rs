use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery channel of a notification.
///
/// Serialized as its variant name (`"Email"`, `"Sms"`, `"Push"`). Any other
/// name deserializes to [`NotificationType::Unknown`] so that topic selection
/// stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Email,
    Sms,
    Push,
    Unknown,
}

impl NotificationType {
    /// All channels that have a consumer.
    pub const CHANNELS: [NotificationType; 3] = [
        NotificationType::Email,
        NotificationType::Sms,
        NotificationType::Push,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "Email",
            NotificationType::Sms => "Sms",
            NotificationType::Push => "Push",
            NotificationType::Unknown => "Unknown",
        }
    }

    /// Lowercase channel name used for metric prefixes and worker selection.
    pub fn channel_name(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
            NotificationType::Push => "push",
            NotificationType::Unknown => "unknown",
        }
    }
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "email" => NotificationType::Email,
            "sms" => NotificationType::Sms,
            "push" => NotificationType::Push,
            _ => NotificationType::Unknown,
        }
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification as it travels over the bus.
///
/// Immutable once published. The body travels under the `message` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub recipient: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(rename = "message")]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationMessage {
    /// Create a message stamped with the current UTC time.
    pub fn new(
        notification_type: NotificationType,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            recipient: recipient.into(),
            subject: None,
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Terminal delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Success => write!(f, "SUCCESS"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// The persisted, terminal outcome of processing one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message: NotificationMessage,
    pub status: DeliveryStatus,
    pub error_detail: Option<String>,
    pub logged_at: DateTime<Utc>,
}
