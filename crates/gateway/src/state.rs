//! Shared application state for the Axum ingress server.

use std::sync::Arc;

use courier_dispatch::{MetricsRegistry, NotificationRouter, Publisher};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub router: NotificationRouter,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn Publisher>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            router: NotificationRouter::new(publisher, metrics.router()),
            metrics,
        }
    }
}
