//! Configuration types for the amqp-lifecycle crate
//!
//! This module defines the settings that control how the lifecycle
//! coordinator talks to the broker client: request timeouts, notification
//! buffering and registry capacity.

use std::time::Duration;

use amqp_registry::DEFAULT_MAX_SUBSCRIPTIONS;

use crate::error::{LifecycleError, Result};

/// Configuration for the ConnectionLifecycle
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Upper bound on every broker call (connect, list, subscribe, publish, ...)
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// Capacity of the lifecycle notification channel
    /// Default: 256
    pub event_buffer_size: usize,

    /// Maximum number of subscriptions (active plus pending)
    /// Default: 1000
    pub max_subscriptions: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            event_buffer_size: 256,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }
}

impl LifecycleConfig {
    /// Create a new LifecycleConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a LifecycleConfig that gives up on slow brokers quickly
    pub fn fast() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Create a LifecycleConfig optimized for resource efficiency
    pub fn resource_efficient() -> Self {
        Self {
            event_buffer_size: 32,
            max_subscriptions: 100,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout == Duration::ZERO {
            return Err(LifecycleError::Configuration(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(LifecycleError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.max_subscriptions == 0 {
            return Err(LifecycleError::Configuration(
                "Max subscriptions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LifecycleConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_subscriptions, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = LifecycleConfig {
            request_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        assert!(LifecycleConfig::new().with_buffer_size(0).validate().is_err());
        assert!(LifecycleConfig::new()
            .with_max_subscriptions(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_presets() {
        let fast = LifecycleConfig::fast();
        assert_eq!(fast.request_timeout, Duration::from_secs(2));
        assert!(fast.validate().is_ok());

        let efficient = LifecycleConfig::resource_efficient();
        assert_eq!(efficient.max_subscriptions, 100);
        assert!(efficient.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = LifecycleConfig::new()
            .with_request_timeout(Duration::from_millis(500))
            .with_buffer_size(16)
            .with_max_subscriptions(8);

        assert_eq!(config.request_timeout, Duration::from_millis(500));
        assert_eq!(config.event_buffer_size, 16);
        assert_eq!(config.max_subscriptions, 8);
        assert!(config.validate().is_ok());
    }
}
