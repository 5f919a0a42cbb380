//! Dispatcher error types.

use bus::BusError;
use thiserror::Error;

/// Errors raised while starting or running topic workers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The subscription could not be opened.
    #[error("Failed to subscribe to '{topic}': {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: BusError,
    },

    /// The subscription yielded an error instead of a delivery.
    #[error("Delivery error on '{topic}': {source}")]
    Delivery {
        topic: String,
        #[source]
        source: BusError,
    },

    /// A delivery could not be settled.
    #[error("Failed to settle delivery on '{topic}': {source}")]
    Settle {
        topic: String,
        #[source]
        source: BusError,
    },

    /// The transport ended the subscription.
    #[error("Subscription to '{topic}' ended")]
    SubscriptionEnded { topic: String },

    /// The worker task panicked or was aborted.
    #[error("Worker for '{topic}' did not finish: {message}")]
    WorkerFailed { topic: String, message: String },
}

/// Result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
