use thiserror::Error;

/// Failures of the dispatch pipeline outside of a delivery attempt.
///
/// Delivery failures themselves are [`courier_notifier::DeliveryError`]s and
/// only drive the retry loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The bus could not be reached, or a produce/consume/commit failed.
    #[error("Transport error: {0}")]
    Transport(#[from] redis::RedisError),

    /// The in-process bus has no producers left.
    #[error("Bus closed")]
    BusClosed,

    /// A payload could not be encoded or decoded.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The delivery log could not be written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A component could not be constructed; fatal.
    #[error("Startup error: {0}")]
    Startup(String),
}
