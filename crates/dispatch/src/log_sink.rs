//! Delivery log: one terminal record per processed notification.
//!
//! Writes are best-effort. The consumer logs a failed `save` and moves on; it
//! never retries it and never holds back the bus commit because of it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use courier_common::types::{DeliveryRecord, DeliveryStatus, NotificationMessage};

use crate::error::DispatchError;

/// Durable store for terminal delivery outcomes.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persist the terminal outcome of `message` and return the stored record.
    async fn save(
        &self,
        message: &NotificationMessage,
        status: DeliveryStatus,
        error_detail: Option<&str>,
    ) -> Result<DeliveryRecord, DispatchError>;
}

fn record(
    message: &NotificationMessage,
    status: DeliveryStatus,
    error_detail: Option<&str>,
) -> DeliveryRecord {
    DeliveryRecord {
        message: message.clone(),
        status,
        error_detail: error_detail.map(str::to_string),
        logged_at: Utc::now(),
    }
}

/// PostgreSQL-backed log writing to `notification_logs`.
///
/// The table is provisioned outside this service:
///
/// ```sql
/// CREATE TABLE notification_logs (
///     id            BIGSERIAL PRIMARY KEY,
///     type          TEXT        NOT NULL,
///     recipient     TEXT        NOT NULL,
///     subject       TEXT,
///     message       TEXT        NOT NULL,
///     status        TEXT        NOT NULL,
///     error_message TEXT,
///     created_at    TIMESTAMPTZ NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct PgLogSink {
    pool: PgPool,
}

impl PgLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for PgLogSink {
    async fn save(
        &self,
        message: &NotificationMessage,
        status: DeliveryStatus,
        error_detail: Option<&str>,
    ) -> Result<DeliveryRecord, DispatchError> {
        let record = record(message, status, error_detail);

        sqlx::query(
            r#"
            INSERT INTO notification_logs (type, recipient, subject, message, status, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.message.notification_type.to_string())
        .bind(&record.message.recipient)
        .bind(&record.message.subject)
        .bind(&record.message.body)
        .bind(record.status.to_string())
        .bind(&record.error_detail)
        .bind(record.logged_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            recipient = %record.message.recipient,
            status = %record.status,
            "Delivery record saved"
        );

        Ok(record)
    }
}

/// In-memory log, for embedding and tests.
///
/// Can be switched into a failing mode to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<DeliveryRecord>>,
    failing: AtomicBool,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (`true`) or succeed again (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn save(
        &self,
        message: &NotificationMessage,
        status: DeliveryStatus,
        error_detail: Option<&str>,
    ) -> Result<DeliveryRecord, DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Persistence(sqlx::Error::PoolTimedOut));
        }

        let record = record(message, status, error_detail);
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::NotificationType;

    #[tokio::test]
    async fn test_memory_sink_stores_records() {
        let sink = MemoryLogSink::new();
        let message = NotificationMessage::new(NotificationType::Sms, "+15550100", "hi");

        let saved = sink
            .save(&message, DeliveryStatus::Success, Some("OK"))
            .await
            .unwrap();

        assert_eq!(saved.status, DeliveryStatus::Success);
        assert_eq!(saved.error_detail.as_deref(), Some("OK"));
        assert!(saved.logged_at >= message.created_at);
        assert_eq!(sink.records(), vec![saved]);
    }

    #[tokio::test]
    async fn test_memory_sink_failing_mode() {
        let sink = MemoryLogSink::new();
        let message = NotificationMessage::new(NotificationType::Email, "a@b.com", "hi");

        sink.set_failing(true);
        let err = sink
            .save(&message, DeliveryStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Persistence(_)));
        assert!(sink.records().is_empty());

        sink.set_failing(false);
        sink.save(&message, DeliveryStatus::Failed, None).await.unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
