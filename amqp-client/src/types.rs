//! Core types for the amqp-client crate.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Name of the broker's default (unnamed) exchange as reported by the management API.
pub const DEFAULT_EXCHANGE_NAME: &str = "/";

/// AMQP exchange types.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    /// Routes on an exact routing-key match
    #[default]
    Direct,
    /// Routes to every bound queue, ignoring the routing key
    Fanout,
    /// Routes on routing-key patterns
    Topic,
    /// Routes on message header values
    Headers,
}

impl ExchangeType {
    /// Get the protocol name of the exchange type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }

    /// Whether messages on this exchange type are filtered by routing key.
    pub fn uses_routing_key(&self) -> bool {
        matches!(self, ExchangeType::Direct | ExchangeType::Topic)
    }
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeType {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeType::Direct),
            "fanout" => Ok(ExchangeType::Fanout),
            "topic" => Ok(ExchangeType::Topic),
            "headers" | "match" => Ok(ExchangeType::Headers),
            other => Err(BrokerError::InvalidConfig(format!(
                "unknown exchange type '{}'",
                other
            ))),
        }
    }
}

/// An exchange as reported by the broker on connect.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExchangeDescriptor {
    /// Exchange name
    pub name: String,
    /// Exchange type
    #[serde(rename = "type")]
    pub exchange_type: ExchangeType,
}

impl ExchangeDescriptor {
    /// Create a new exchange descriptor.
    pub fn new(name: impl Into<String>, exchange_type: ExchangeType) -> Self {
        Self {
            name: name.into(),
            exchange_type,
        }
    }

    /// Whether this is the broker's default exchange (empty name or `/`).
    pub fn is_default_exchange(&self) -> bool {
        self.name.is_empty() || self.name == DEFAULT_EXCHANGE_NAME
    }
}

impl std::fmt::Display for ExchangeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.exchange_type)
    }
}

/// A named set of broker connection settings.
///
/// Corresponds to one entry of the connection list a user picks from before
/// connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Display name of the connection
    pub name: String,

    /// Broker host name or address
    /// Default: "localhost"
    pub host: String,

    /// AMQP port
    /// Default: 5672
    pub amqp_port: u16,

    /// Management (web) API port, used for exchange listing
    /// Default: 15672
    pub web_port: u16,

    /// Virtual host
    /// Default: "/"
    pub virtual_host: String,

    /// Username
    /// Default: "guest"
    pub username: String,

    /// Password
    /// Default: "guest"
    pub password: String,

    /// Seconds between reconnect attempts after the connection drops
    /// Default: 5
    pub reconnect_interval_secs: u16,

    /// Requested heartbeat interval in seconds
    /// Default: 30
    pub requested_heartbeat_secs: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            host: "localhost".to_string(),
            amqp_port: 5672,
            web_port: 15672,
            virtual_host: "/".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            reconnect_interval_secs: 5,
            requested_heartbeat_secs: 30,
        }
    }
}

impl ConnectionConfig {
    /// Create a config with the given name and host and default settings otherwise.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_ports(mut self, amqp_port: u16, web_port: u16) -> Self {
        self.amqp_port = amqp_port;
        self.web_port = web_port;
        self
    }

    pub fn with_virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.virtual_host = virtual_host.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_reconnect_interval(mut self, secs: u16) -> Self {
        self.reconnect_interval_secs = secs;
        self
    }

    /// Reconnect interval as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.reconnect_interval_secs))
    }

    /// Requested heartbeat as a [`Duration`].
    pub fn requested_heartbeat(&self) -> Duration {
        Duration::from_secs(u64::from(self.requested_heartbeat_secs))
    }

    /// `amqp://host:port/vhost` style address, without credentials.
    pub fn address(&self) -> String {
        format!("amqp://{}:{}{}", self.host, self.amqp_port, self.virtual_host_path())
    }

    fn virtual_host_path(&self) -> String {
        if self.virtual_host == "/" {
            "/".to_string()
        } else {
            format!("/{}", self.virtual_host.trim_start_matches('/'))
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.name.trim().is_empty() {
            return Err(BrokerError::InvalidConfig(
                "Connection name cannot be blank".to_string(),
            ));
        }

        if self.host.trim().is_empty() {
            return Err(BrokerError::InvalidConfig(format!(
                "Connection '{}' has a blank host",
                self.name
            )));
        }

        if self.amqp_port == 0 || self.web_port == 0 {
            return Err(BrokerError::InvalidConfig(format!(
                "Connection '{}' ports must be greater than 0",
                self.name
            )));
        }

        Ok(())
    }
}
