//! Error types for the amqp-registry crate.

use amqp_client::{BrokerError, SubscriptionKey};

/// Errors from subscription registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A required field was blank
    #[error("{field} cannot be blank")]
    Validation {
        /// Human-readable name of the field
        field: &'static str,
    },

    /// A subscription with the same identity is registered or pending
    #[error("Subscription already exists for exchange {key}")]
    AlreadyExists {
        /// Identity of the existing subscription
        key: SubscriptionKey,
    },

    /// No subscription with the requested identity is registered
    #[error("Subscription not found for exchange {key}")]
    NotFound {
        /// Identity that was looked up
        key: SubscriptionKey,
    },

    /// The registry is at capacity
    #[error("Registry is full (max {max_subscriptions} subscriptions)")]
    RegistryFull {
        /// Configured capacity
        max_subscriptions: usize,
    },

    /// The broker refused or failed the request
    #[error("Broker request failed: {0}")]
    Broker(#[from] BrokerError),
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
