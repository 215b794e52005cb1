use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::types::NotificationType;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection string (message bus bootstrap address)
    pub redis_url: String,

    /// PostgreSQL connection string for the delivery log (required by workers)
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 5)
    pub db_max_connections: u32,

    /// Port the ingress gateway listens on (default: 3000)
    pub gateway_port: u16,

    /// Port the worker exposes `/metrics` on (default: 8080)
    pub metrics_port: u16,

    /// Channel a worker process serves (`email`, `sms` or `push`)
    pub worker_channel: Option<String>,

    /// Base consumer name; instance N of a worker appends `-N`
    pub consumer_name: Option<String>,

    /// Identity of this process, part of the default consumer name
    pub instance_id: String,

    /// Pending entries idle for this long are claimed from other consumers
    /// (default: 300000; must exceed the longest retry cycle)
    pub claim_idle_ms: u64,

    /// Approximate upper bound on entries kept per stream (default: 100000)
    pub stream_max_len: usize,

    /// Number of consumer instances a worker runs for its channel (default: 1)
    pub worker_concurrency: usize,

    /// Consumer group ids per channel
    pub email_consumer_group: String,
    pub sms_consumer_group: String,
    pub push_consumer_group: String,

    /// Attempts per message before it is logged as FAILED (default: 3)
    pub retry_max_attempts: u32,

    /// Fixed delay between attempts in milliseconds (default: 1000)
    pub retry_delay_ms: u64,

    /// SMTP relay host; the email worker refuses to start without it
    pub smtp_host: Option<String>,

    /// SMTP port (default: 587, STARTTLS)
    pub smtp_port: u16,

    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,

    /// Sender address for outgoing email
    pub smtp_from: Option<String>,

    /// SMS gateway endpoint
    pub sms_api_url: String,

    /// SMS gateway API key
    pub sms_api_key: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            gateway_port: parse_var("GATEWAY_PORT", 3000)?,
            metrics_port: parse_var("METRICS_PORT", 8080)?,
            worker_channel: std::env::var("WORKER_CHANNEL").ok(),
            consumer_name: std::env::var("CONSUMER_NAME").ok(),
            instance_id: process_instance_id(),
            claim_idle_ms: parse_var("CLAIM_IDLE_MS", 300_000)?,
            stream_max_len: parse_var("STREAM_MAX_LEN", 100_000)?,
            worker_concurrency: parse_var("WORKER_CONCURRENCY", 1)?,
            email_consumer_group: std::env::var("EMAIL_CONSUMER_GROUP")
                .unwrap_or_else(|_| "email-service-group".to_string()),
            sms_consumer_group: std::env::var("SMS_CONSUMER_GROUP")
                .unwrap_or_else(|_| "sms-service-group".to_string()),
            push_consumer_group: std::env::var("PUSH_CONSUMER_GROUP")
                .unwrap_or_else(|_| "push-service-group".to_string()),
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", 3)?,
            retry_delay_ms: parse_var("RETRY_DELAY_MS", 1000)?,
            smtp_host: std::env::var("SMTP_HOST").ok(),
            smtp_port: parse_var("SMTP_PORT", 587)?,
            smtp_username: std::env::var("SMTP_USERNAME").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            smtp_from: std::env::var("SMTP_FROM").ok(),
            sms_api_url: std::env::var("SMS_API_URL")
                .unwrap_or_else(|_| "https://textbelt.com/text".to_string()),
            sms_api_key: std::env::var("SMS_API_KEY").unwrap_or_else(|_| "textbelt".to_string()),
        })
    }

    /// Consumer group id for a channel.
    pub fn consumer_group(&self, channel: NotificationType) -> String {
        match channel {
            NotificationType::Email => self.email_consumer_group.clone(),
            NotificationType::Sms => self.sms_consumer_group.clone(),
            NotificationType::Push => self.push_consumer_group.clone(),
            NotificationType::Unknown => "unknown-service-group".to_string(),
        }
    }

    /// Consumer name for instance `index` of a channel worker.
    ///
    /// Without `CONSUMER_NAME` the name embeds the process identity, so two
    /// replicas of the same channel never share a pending list.
    pub fn consumer_name(&self, channel: NotificationType, index: usize) -> String {
        let base = self.consumer_name.clone().unwrap_or_else(|| {
            format!("{}-worker-{}", channel.channel_name(), self.instance_id)
        });
        format!("{}-{}", base, index)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_millis(self.claim_idle_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: None,
            db_max_connections: 5,
            gateway_port: 3000,
            metrics_port: 8080,
            worker_channel: None,
            consumer_name: None,
            instance_id: process_instance_id(),
            claim_idle_ms: 300_000,
            stream_max_len: 100_000,
            worker_concurrency: 1,
            email_consumer_group: "email-service-group".to_string(),
            sms_consumer_group: "sms-service-group".to_string(),
            push_consumer_group: "push-service-group".to_string(),
            retry_max_attempts: 3,
            retry_delay_ms: 1000,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            sms_api_url: "https://textbelt.com/text".to_string(),
            sms_api_key: "textbelt".to_string(),
        }
    }
}

/// `<hostname>-<pid>`; the pid alone when no hostname is known.
fn process_instance_id() -> String {
    let pid = std::process::id();
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.trim().is_empty() => format!("{}-{}", host.trim(), pid),
        _ => pid.to_string(),
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> anyhow::Result<T> {
    raw.trim().parse().map_err(|_| {
        anyhow::anyhow!(
            "{} must be a valid {}",
            name,
            std::any::type_name::<T>()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_accepts_numbers() {
        let port: u16 = parse_value("SMTP_PORT", " 2525 ").unwrap();
        assert_eq!(port, 2525);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let err = parse_value::<u32>("RETRY_MAX_ATTEMPTS", "three").unwrap_err();
        assert!(err.to_string().contains("RETRY_MAX_ATTEMPTS must be a valid u32"));
    }

    #[test]
    fn test_consumer_groups_per_channel() {
        let config = AppConfig::default();
        assert_eq!(config.consumer_group(NotificationType::Email), "email-service-group");
        assert_eq!(config.consumer_group(NotificationType::Sms), "sms-service-group");
        assert_eq!(config.consumer_group(NotificationType::Push), "push-service-group");
    }

    #[test]
    fn test_consumer_name_defaults_to_channel_and_instance() {
        let mut config = AppConfig {
            instance_id: "host-a-42".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.consumer_name(NotificationType::Sms, 0),
            "sms-worker-host-a-42-0"
        );

        config.consumer_name = Some("pod-a".to_string());
        assert_eq!(config.consumer_name(NotificationType::Sms, 2), "pod-a-2");
    }

    #[test]
    fn test_replicas_get_distinct_default_names() {
        let a = AppConfig {
            instance_id: "host-a-1".to_string(),
            ..AppConfig::default()
        };
        let b = AppConfig {
            instance_id: "host-b-1".to_string(),
            ..AppConfig::default()
        };
        assert_ne!(
            a.consumer_name(NotificationType::Email, 0),
            b.consumer_name(NotificationType::Email, 0)
        );
    }

    #[test]
    fn test_process_instance_id_contains_pid() {
        assert!(process_instance_id().ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn test_default_retry_delay_is_one_second() {
        assert_eq!(AppConfig::default().retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_stream_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.claim_idle(), Duration::from_secs(300));
        assert_eq!(config.stream_max_len, 100_000);
    }
}
