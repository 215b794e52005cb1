//! Courier HTTP ingress.
//!
//! Endpoints:
//! - POST /api/notification: publish a notification to its channel topic
//! - GET  /metrics: Prometheus text exposition
//! - GET  /health: liveness probe

pub mod routes;
pub mod state;
