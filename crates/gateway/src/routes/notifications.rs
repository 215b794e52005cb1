//! Notification ingress route.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use courier_common::error::AppError;
use courier_common::types::{NotificationMessage, NotificationType};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notification", post(send_notification))
}

/// Body of `POST /api/notification`. PascalCase keys are accepted as well.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type", alias = "Type")]
    pub notification_type: NotificationType,
    #[serde(alias = "Recipient")]
    pub recipient: String,
    #[serde(default, alias = "Subject")]
    pub subject: Option<String>,
    #[serde(alias = "Message")]
    pub message: String,
}

impl NotificationRequest {
    fn into_message(self) -> NotificationMessage {
        NotificationMessage {
            notification_type: self.notification_type,
            recipient: self.recipient,
            subject: self.subject,
            body: self.message,
            created_at: Utc::now(),
        }
    }
}

/// Acknowledgement returned once the notification is on the bus.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedResponse {
    pub status: &'static str,
    #[serde(rename = "Type")]
    pub notification_type: NotificationType,
    pub recipient: String,
}

/// POST /api/notification: Publish a notification for asynchronous delivery.
///
/// Delivery happens later in the channel workers; the caller only learns that
/// the notification was accepted by the bus.
async fn send_notification(
    State(state): State<AppState>,
    body: Result<Json<Option<NotificationRequest>>, JsonRejection>,
) -> Result<Json<PublishedResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let request =
        request.ok_or_else(|| AppError::Validation("notification == null".to_string()))?;

    let message = request.into_message();
    state
        .router
        .route(&message)
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;

    Ok(Json(PublishedResponse {
        status: "Published to Kafka",
        notification_type: message.notification_type,
        recipient: message.recipient,
    }))
}
