//! Courier channel worker binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_common::types::NotificationType;
use courier_dispatch::{ChannelConsumer, DispatchError, LogSink, MetricsRegistry, PgLogSink, RetryPolicy};
use courier_notifier::{EmailConfig, EmailSender, PushSender, Sender, SmsConfig, SmsSender};
use courier_worker::runner::{connect_subscriptions, parse_channel, run_instances};
use courier_worker::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier_worker=info,courier_dispatch=info,courier_notifier=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env().map_err(critical)?;
    let channel = parse_channel(config.worker_channel.as_deref()).map_err(critical)?;

    // Connect to the delivery log
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| critical(DispatchError::Startup("DATABASE_URL is not set".to_string())))?;
    let pool = db::create_pool(&database_url, config.db_max_connections)
        .await
        .map_err(critical)?;
    let sink: Arc<dyn LogSink> = Arc::new(PgLogSink::new(pool));

    let metrics = Arc::new(MetricsRegistry::new());
    let shutdown = CancellationToken::new();

    // Metrics server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(critical)?;
    tracing::info!("Metrics server listening on {}", addr);
    let server = tokio::spawn({
        let app = server::create_router(metrics.clone());
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }
    });

    // Graceful shutdown on Ctrl+C
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
            shutdown.cancel();
        }
    });

    let result = match channel {
        NotificationType::Email => {
            let email_config = EmailConfig::from_app_config(&config).ok_or_else(|| {
                critical(DispatchError::Startup(
                    "SMTP_HOST and SMTP_FROM must be set".to_string(),
                ))
            })?;
            let sender = EmailSender::new(email_config).map_err(critical)?;
            run_worker(sender, &config, sink, &metrics, shutdown.clone()).await
        }
        NotificationType::Sms => {
            let sender = SmsSender::new(SmsConfig::from_app_config(&config)).map_err(critical)?;
            run_worker(sender, &config, sink, &metrics, shutdown.clone()).await
        }
        NotificationType::Push => {
            run_worker(PushSender::new(), &config, sink, &metrics, shutdown.clone()).await
        }
        NotificationType::Unknown => Err(critical(DispatchError::Startup(
            "no consumer exists for unknown notifications".to_string(),
        ))),
    };

    shutdown.cancel();
    if let Err(e) = server.await? {
        tracing::error!(error = %e, "Metrics server exited with error");
    }

    result?;
    tracing::info!("Courier worker stopped.");
    Ok(())
}

/// Run every consumer instance of `sender`'s channel until shutdown.
async fn run_worker<S: Sender + 'static>(
    sender: S,
    config: &AppConfig,
    sink: Arc<dyn LogSink>,
    metrics: &MetricsRegistry,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let channel = sender.channel();
    let policy = RetryPolicy::new(config.retry_max_attempts, config.retry_delay());
    let consumer = ChannelConsumer::new(sender, sink, metrics.channel(channel)).with_policy(policy);

    let subscriptions = connect_subscriptions(config, channel)
        .await
        .map_err(critical)?;
    tracing::info!(
        channel = %channel,
        instances = subscriptions.len(),
        "Starting channel consumers"
    );

    run_instances(Arc::new(consumer), subscriptions, shutdown).await;
    Ok(())
}

/// Log a startup failure before it terminates the process.
fn critical(e: impl Into<anyhow::Error>) -> anyhow::Error {
    let e = e.into();
    tracing::error!(severity = "critical", error = %e, "Worker failed to start");
    e
}
