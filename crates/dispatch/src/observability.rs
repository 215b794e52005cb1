//! Delivery metrics.
//!
//! The consumer reports through the [`DeliveryObserver`] hooks; [`ChannelMetrics`]
//! is the in-process implementation. Metric handles live in an explicit
//! [`MetricsRegistry`] that is passed to whoever needs it, and the registry
//! renders everything in the Prometheus text exposition format.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier_common::types::NotificationType;

/// Upper bounds (seconds) of the send duration histogram buckets.
pub const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Hook points fired by a channel consumer.
pub trait DeliveryObserver: Send + Sync {
    /// One send attempt finished (successfully or not) after `elapsed`.
    fn on_attempt(&self, elapsed: Duration);

    /// A message reached the SUCCESS terminal state.
    fn on_sent(&self);

    /// A message exhausted its attempts.
    fn on_failed(&self);
}

/// Cumulative-bucket histogram of durations.
#[derive(Debug)]
pub struct DurationHistogram {
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum_micros: AtomicU64,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self {
            buckets: DURATION_BUCKETS.iter().map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        for (bound, bucket) in DURATION_BUCKETS.iter().zip(&self.buckets) {
            if secs <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> Duration {
        Duration::from_micros(self.sum_micros.load(Ordering::Relaxed))
    }

    fn render(&self, out: &mut String, name: &str, help: &str) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for (bound, bucket) in DURATION_BUCKETS.iter().zip(&self.buckets) {
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{}\"}} {}",
                name,
                bound,
                bucket.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, self.count());
        let _ = writeln!(out, "{}_sum {}", name, self.sum().as_secs_f64());
        let _ = writeln!(out, "{}_count {}", name, self.count());
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters and latency histogram of one delivery channel.
#[derive(Debug)]
pub struct ChannelMetrics {
    channel: NotificationType,
    sent: AtomicU64,
    failed: AtomicU64,
    send_duration: DurationHistogram,
}

impl ChannelMetrics {
    pub fn new(channel: NotificationType) -> Self {
        Self {
            channel,
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            send_duration: DurationHistogram::new(),
        }
    }

    pub fn channel(&self) -> NotificationType {
        self.channel
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn send_duration(&self) -> &DurationHistogram {
        &self.send_duration
    }

    fn render(&self, out: &mut String) {
        let prefix = self.channel.channel_name();

        let _ = writeln!(
            out,
            "# HELP {p}_sent_total Notifications delivered on the {p} channel.\n\
             # TYPE {p}_sent_total counter\n\
             {p}_sent_total {}",
            self.sent(),
            p = prefix
        );
        let _ = writeln!(
            out,
            "# HELP {p}_failed_total Notifications that exhausted their attempts on the {p} channel.\n\
             # TYPE {p}_failed_total counter\n\
             {p}_failed_total {}",
            self.failed(),
            p = prefix
        );
        self.send_duration.render(
            out,
            &format!("{}_send_duration_seconds", prefix),
            "Duration of single send attempts in seconds.",
        );
    }
}

impl DeliveryObserver for ChannelMetrics {
    fn on_attempt(&self, elapsed: Duration) {
        self.send_duration.observe(elapsed);
    }

    fn on_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn on_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Publish counters of the ingress router, labelled by topic.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    published: Mutex<BTreeMap<String, u64>>,
    failed: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self, topic: &str) {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        *published.entry(topic.to_string()).or_insert(0) += 1;
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published(&self, topic: &str) -> u64 {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "# HELP published_total Notifications published to the bus.");
        let _ = writeln!(out, "# TYPE published_total counter");
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        for (topic, count) in published.iter() {
            let _ = writeln!(out, "published_total{{topic=\"{}\"}} {}", topic, count);
        }
        let _ = writeln!(out, "# HELP publish_failed_total Publish attempts rejected by the bus.");
        let _ = writeln!(out, "# TYPE publish_failed_total counter");
        let _ = writeln!(out, "publish_failed_total {}", self.failed());
    }
}

/// Owner of every metric handle in a process.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    channels: Mutex<Vec<Arc<ChannelMetrics>>>,
    router: Arc<RouterMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `channel`, created on first use.
    pub fn channel(&self, channel: NotificationType) -> Arc<ChannelMetrics> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = channels.iter().find(|m| m.channel() == channel) {
            return existing.clone();
        }
        let metrics = Arc::new(ChannelMetrics::new(channel));
        channels.push(metrics.clone());
        metrics
    }

    pub fn router(&self) -> Arc<RouterMetrics> {
        self.router.clone()
    }

    /// Prometheus text exposition of all registered metrics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        for metrics in channels.iter() {
            metrics.render(&mut out);
        }
        self.router.render(&mut out);
        out
    }
}
