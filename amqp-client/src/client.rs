//! The broker client capability consumed by the registry and lifecycle.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::event::BrokerEvent;
use crate::subscription::ExchangeSubscription;
use crate::types::{ConnectionConfig, ExchangeDescriptor};

/// Connection to an AMQP broker.
///
/// Implementations own the wire protocol and transport. Subscribe and
/// unsubscribe are asynchronous requests: returning `Ok(())` means the
/// request was sent, and the broker's acknowledgment arrives later as a
/// [`BrokerEvent::SubscriptionConfirmed`] or
/// [`BrokerEvent::UnsubscriptionConfirmed`] carrying the same subscription.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; events may be raised from a
/// network I/O task while callers issue requests from another thread.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open a connection using the given settings.
    ///
    /// Raises [`BrokerEvent::Connected`] once the connection is usable.
    async fn connect(&self, config: &ConnectionConfig) -> Result<()>;

    /// Close the connection.
    ///
    /// Raises [`BrokerEvent::Disconnected`].
    async fn disconnect(&self) -> Result<()>;

    /// List the exchanges declared on the connected virtual host.
    async fn list_exchanges(&self) -> Result<Vec<ExchangeDescriptor>>;

    /// Ask the broker to start delivering messages for a subscription.
    async fn request_subscribe(&self, subscription: ExchangeSubscription) -> Result<()>;

    /// Ask the broker to stop delivering messages for a subscription.
    async fn request_unsubscribe(&self, subscription: ExchangeSubscription) -> Result<()>;

    /// Publish a message to an exchange.
    async fn publish(&self, exchange_name: &str, routing_key: &str, payload: Bytes) -> Result<()>;

    /// Register for broker events.
    ///
    /// Each call returns an independent receiver; dropping it unregisters.
    fn events(&self) -> broadcast::Receiver<BrokerEvent>;
}
