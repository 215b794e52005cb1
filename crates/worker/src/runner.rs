//! Consumer instances of one channel.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use courier_common::config::AppConfig;
use courier_common::redis_pool::create_redis_pool;
use courier_common::types::NotificationType;
use courier_dispatch::{ChannelConsumer, DispatchError, RedisSubscription, Subscription, topic_for};
use courier_notifier::Sender;

/// Resolve the `WORKER_CHANNEL` setting to a consumable channel.
pub fn parse_channel(raw: Option<&str>) -> Result<NotificationType, DispatchError> {
    let raw = raw.ok_or_else(|| DispatchError::Startup("WORKER_CHANNEL is not set".to_string()))?;
    match NotificationType::from(raw.trim().to_string()) {
        NotificationType::Unknown => Err(DispatchError::Startup(format!(
            "WORKER_CHANNEL must be one of email, sms, push (got {:?})",
            raw
        ))),
        channel => Ok(channel),
    }
}

/// Join the channel's consumer group once per configured instance.
///
/// Every instance gets its own connection since `XREADGROUP ... BLOCK` holds
/// the connection for the duration of the read.
pub async fn connect_subscriptions(
    config: &AppConfig,
    channel: NotificationType,
) -> anyhow::Result<Vec<RedisSubscription>> {
    let topic = topic_for(channel);
    let group = config.consumer_group(channel);

    let mut subscriptions = Vec::with_capacity(config.worker_concurrency);
    for index in 0..config.worker_concurrency.max(1) {
        let consumer_name = config.consumer_name(channel, index);
        let conn = create_redis_pool(&config.redis_url).await?;
        let subscription = RedisSubscription::subscribe(conn, topic, &group, &consumer_name)
            .await?
            .with_claim_idle(config.claim_idle());
        tracing::info!(topic, group = %group, consumer = %consumer_name, "Joined consumer group");
        subscriptions.push(subscription);
    }
    Ok(subscriptions)
}

/// Run one consumer task per subscription and wait for all of them to stop.
pub async fn run_instances<S, B>(
    consumer: Arc<ChannelConsumer<S>>,
    subscriptions: Vec<B>,
    shutdown: CancellationToken,
) where
    S: Sender + 'static,
    B: Subscription + 'static,
{
    let mut tasks = JoinSet::new();
    for mut subscription in subscriptions {
        let consumer = consumer.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            consumer.run(&mut subscription, shutdown).await;
        });
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Consumer task aborted");
        }
    }
}
