use std::path::PathBuf;

use amqp_lifecycle::LifecycleError;
use thiserror::Error;

/// Errors that can occur in the AMQP SDK
#[derive(Error, Debug)]
pub enum SdkError {
    /// Connection lifecycle rejected or failed the operation
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// No connection profile with this name
    #[error("Connection profile '{0}' not found")]
    ProfileNotFound(String),

    /// Two connection profiles share a name
    #[error("Duplicate connection profile '{0}'")]
    DuplicateProfile(String),

    /// Failed to read the connection profile file
    #[error("Failed to read connection profiles from {path}: {source}")]
    ProfileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Connection profile file is not valid JSON
    #[error("Invalid connection profile format: {0}")]
    ProfileFormat(#[from] serde_json::Error),

    /// A connection profile failed validation
    #[error("Invalid connection profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Background worker is no longer running
    #[error("Background worker disconnected")]
    WorkerDisconnected,

    /// Background worker could not start its runtime
    #[error("Failed to start background runtime: {0}")]
    Runtime(String),

    /// The platform has no configuration directory
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use amqp_lifecycle::ConnectionState;

    #[test]
    fn test_lifecycle_errors_are_transparent() {
        let error: SdkError = LifecycleError::NotConnected {
            state: ConnectionState::Disconnected,
        }
        .into();
        assert_eq!(error.to_string(), "Not connected (connection is disconnected)");
    }

    #[test]
    fn test_profile_error_display() {
        assert_eq!(
            SdkError::ProfileNotFound("staging".to_string()).to_string(),
            "Connection profile 'staging' not found"
        );

        let error = SdkError::InvalidProfile {
            name: "local".to_string(),
            reason: "blank host".to_string(),
        };
        assert!(error.to_string().contains("local"));
    }
}
