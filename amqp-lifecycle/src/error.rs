use std::time::Duration;

use amqp_client::BrokerError;
use amqp_registry::RegistryError;
use thiserror::Error;

use crate::state::ConnectionState;

/// Errors that can occur while coordinating the connection lifecycle
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Subscription registry rejected the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Broker client call failed
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A required field was blank
    #[error("{field} cannot be blank")]
    Validation { field: &'static str },

    /// Operation needs an open connection
    #[error("Not connected (connection is {state})")]
    NotConnected { state: ConnectionState },

    /// Connect called while a connection is open or opening
    #[error("Already connected (connection is {state})")]
    AlreadyConnected { state: ConnectionState },

    /// Broker call did not complete in time
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Invalid lifecycle configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_display() {
        let error = LifecycleError::NotConnected {
            state: ConnectionState::Disconnected,
        };
        assert_eq!(error.to_string(), "Not connected (connection is disconnected)");

        let error = LifecycleError::Timeout {
            operation: "connect",
            timeout: Duration::from_secs(2),
        };
        assert_eq!(error.to_string(), "connect timed out after 2s");

        let error = LifecycleError::Validation { field: "Message" };
        assert_eq!(error.to_string(), "Message cannot be blank");
    }

    #[test]
    fn test_registry_error_is_transparent() {
        let error: LifecycleError = RegistryError::Validation {
            field: "Exchange Name",
        }
        .into();
        assert_eq!(error.to_string(), "Exchange Name cannot be blank");
    }
}
