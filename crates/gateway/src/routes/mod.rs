pub mod health;
pub mod metrics;
pub mod notifications;

use axum::Router;

use crate::state::AppState;

/// Build the complete ingress router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(notifications::router())
        .with_state(state)
}
