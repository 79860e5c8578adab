//! Error types for the amqp-client crate.

/// Errors reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Failed to connect to the broker
    #[error("Failed to connect to {address}: {reason}")]
    Connect {
        /// Broker address
        address: String,
        /// Failure reason
        reason: String,
    },

    /// Failed to close the connection cleanly
    #[error("Failed to disconnect: {0}")]
    Disconnect(String),

    /// Failed to publish a message
    #[error("Failed to publish to exchange '{exchange_name}': {reason}")]
    Publish {
        /// Target exchange
        exchange_name: String,
        /// Failure reason
        reason: String,
    },

    /// A subscribe or unsubscribe request was refused
    #[error("Request failed: {0}")]
    Request(String),

    /// Failed to query the exchange list
    #[error("Failed to query exchanges: {0}")]
    ExchangeQuery(String),

    /// The client has no open connection
    #[error("Not connected to a broker")]
    NotConnected,

    /// Invalid configuration or input
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience type alias for Results using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;
