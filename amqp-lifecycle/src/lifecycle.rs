//! Connection lifecycle coordinator
//!
//! Reacts to broker connection events and keeps the subscription registry and
//! the cached exchange list consistent with them. Caller requests are checked
//! against the current connection state before they reach the broker.

use std::future::Future;
use std::sync::Arc;

use amqp_client::{
    BrokerClient, BrokerEvent, ConnectionConfig, ExchangeSubscription, ExchangeType,
    MessageHandler,
};
use amqp_registry::{ExchangeCatalog, Reconciliation, SubscriptionRegistry};
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::state::{ConnectionState, LifecycleEvent};

/// Coordinates one broker connection and its subscriptions.
///
/// Broker events must be fed to [`handle_event`](Self::handle_event) in the
/// order the client raised them; [`spawn_event_pump`](crate::spawn_event_pump)
/// does this on a tokio task.
pub struct ConnectionLifecycle {
    client: Arc<dyn BrokerClient>,
    registry: SubscriptionRegistry,
    state: RwLock<ConnectionState>,
    catalog: RwLock<ExchangeCatalog>,
    notifier: broadcast::Sender<LifecycleEvent>,
    config: LifecycleConfig,
}

impl ConnectionLifecycle {
    /// Create a coordinator with default configuration
    pub fn new(client: Arc<dyn BrokerClient>) -> Result<Self> {
        Self::with_config(client, LifecycleConfig::default())
    }

    /// Create a coordinator with custom configuration
    pub fn with_config(client: Arc<dyn BrokerClient>, config: LifecycleConfig) -> Result<Self> {
        config.validate()?;

        let (notifier, _) = broadcast::channel(config.event_buffer_size);
        let registry = SubscriptionRegistry::new(Arc::clone(&client), config.max_subscriptions);

        Ok(Self {
            client,
            registry,
            state: RwLock::new(ConnectionState::Disconnected),
            catalog: RwLock::new(ExchangeCatalog::default()),
            notifier,
            config,
        })
    }

    /// Open a connection to the broker.
    ///
    /// Moves to `Connecting`; the `Connected` event from the broker completes
    /// the transition. On failure the state returns to `Disconnected`.
    pub async fn connect(&self, connection: &ConnectionConfig) -> Result<()> {
        connection.validate()?;

        {
            let mut state = self.state.write();
            if state.is_active() {
                return Err(LifecycleError::AlreadyConnected { state: *state });
            }
            *state = ConnectionState::Connecting;
        }
        self.notify(LifecycleEvent::StateChanged {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connecting,
        });

        tracing::info!("Connecting to {} ({})", connection.name, connection.address());

        if let Err(e) = self.call("connect", self.client.connect(connection)).await {
            tracing::warn!("Connection to {} failed: {}", connection.name, e);
            self.transition_from(ConnectionState::Connecting, ConnectionState::Disconnected);
            return Err(e);
        }

        Ok(())
    }

    /// Close the broker connection.
    ///
    /// The registry is cleared when the broker's `Disconnected` event arrives.
    /// Does nothing when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.state().is_active() {
            return Ok(());
        }

        tracing::info!("Disconnecting");
        self.call("disconnect", self.client.disconnect()).await
    }

    /// Request a subscription; see [`SubscriptionRegistry::subscribe`].
    pub async fn subscribe(
        &self,
        exchange_name: &str,
        routing_key: &str,
        handler: MessageHandler,
    ) -> Result<ExchangeSubscription> {
        self.ensure_accepting_requests()?;
        let catalog = self.exchanges();

        // A timed-out request gives up its pending mark
        self.call(
            "subscribe",
            self.registry
                .subscribe(exchange_name, routing_key, catalog.descriptors(), handler),
        )
        .await
    }

    /// Remove a subscription; see [`SubscriptionRegistry::unsubscribe`].
    pub async fn unsubscribe(
        &self,
        exchange_name: &str,
        routing_key: &str,
    ) -> Result<ExchangeSubscription> {
        self.ensure_accepting_requests()?;
        let catalog = self.exchanges();

        self.call(
            "unsubscribe",
            self.registry
                .unsubscribe(exchange_name, routing_key, catalog.descriptors()),
        )
        .await
    }

    /// Publish a message to an exchange.
    ///
    /// Both the exchange name and the payload must be non-empty.
    pub async fn publish(
        &self,
        exchange_name: &str,
        routing_key: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let payload = payload.into();

        if exchange_name.is_empty() {
            return Err(LifecycleError::Validation {
                field: "Exchange Name",
            });
        }
        if payload.is_empty() {
            return Err(LifecycleError::Validation { field: "Message" });
        }

        self.ensure_accepting_requests()?;

        tracing::debug!(
            "Publishing {} bytes to {}:{}",
            payload.len(),
            exchange_name,
            routing_key
        );
        self.call(
            "publish",
            self.client.publish(exchange_name, routing_key, payload),
        )
        .await
    }

    /// Apply a broker event.
    pub async fn handle_event(&self, event: BrokerEvent) {
        tracing::debug!("Handling broker event: {}", event.name());

        match event {
            BrokerEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.refresh_exchanges().await;
            }
            BrokerEvent::Disconnected => {
                let removed = self.reset();
                tracing::info!("Disconnected, dropped {} subscriptions", removed);
            }
            BrokerEvent::Reconnecting => {
                tracing::warn!("Connection lost, broker client is reconnecting");
                self.set_state(ConnectionState::Reconnecting);
            }
            BrokerEvent::Blocked => {
                // Only an open connection can be blocked
                if !self.state().is_active() {
                    tracing::debug!("Ignoring blocked notification while disconnected");
                    return;
                }
                tracing::warn!("Connection blocked by broker");
                self.set_state(ConnectionState::Blocked);
            }
            BrokerEvent::SubscriptionConfirmed(subscription) => {
                let key = subscription.key().clone();
                match self.registry.confirm_subscribed(subscription) {
                    Reconciliation::Applied => self.notify(LifecycleEvent::Subscribed(key)),
                    Reconciliation::Stale => {
                        tracing::warn!("Rejected stale subscription confirmation for {}", key);
                        self.notify(LifecycleEvent::ConfirmationRejected(key));
                    }
                    Reconciliation::Unchanged => {}
                }
            }
            BrokerEvent::UnsubscriptionConfirmed(subscription) => {
                let key = subscription.key().clone();
                match self.registry.confirm_unsubscribed(&subscription) {
                    Reconciliation::Applied => self.notify(LifecycleEvent::Unsubscribed(key)),
                    Reconciliation::Stale => {
                        tracing::warn!("Rejected stale unsubscription confirmation for {}", key);
                        self.notify(LifecycleEvent::ConfirmationRejected(key));
                    }
                    Reconciliation::Unchanged => {}
                }
            }
        }
    }

    /// Recover from broker events that were dropped unseen.
    ///
    /// A skipped `Disconnected` would leave the registry in an epoch whose
    /// confirmations should be rejected, so the connection is treated as lost:
    /// the registry and exchange list are cleared and the state returns to
    /// `Disconnected`. Callers reconnect to resynchronize.
    pub fn handle_lost_events(&self, skipped: u64) {
        tracing::warn!("{} broker events lost, resetting connection state", skipped);
        let removed = self.reset();
        tracing::info!("Dropped {} subscriptions after lost broker events", removed);
        self.notify(LifecycleEvent::EventsLost { skipped });
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Snapshot of the confirmed subscriptions
    pub fn subscriptions(&self) -> Vec<ExchangeSubscription> {
        self.registry.subscriptions()
    }

    /// Snapshot of the known exchanges (default exchange excluded)
    pub fn exchanges(&self) -> ExchangeCatalog {
        self.catalog.read().clone()
    }

    /// Resolve an exchange type against the cached exchange list
    pub fn resolve_exchange_type(&self, exchange_name: &str) -> ExchangeType {
        self.catalog.read().resolve(exchange_name)
    }

    /// Register for lifecycle notifications; drop the receiver to unregister.
    pub fn watch(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.notifier.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    async fn refresh_exchanges(&self) {
        let catalog = match self.call("list_exchanges", self.client.list_exchanges()).await {
            Ok(descriptors) => ExchangeCatalog::from_descriptors(descriptors),
            Err(e) => {
                tracing::warn!("Failed to query exchanges: {}", e);
                ExchangeCatalog::default()
            }
        };

        tracing::info!("Connected, {} exchanges available", catalog.len());
        let names = catalog.names();
        *self.catalog.write() = catalog;
        self.notify(LifecycleEvent::ExchangesUpdated(names));
    }

    /// Clear the registry and exchange list and move to `Disconnected`.
    fn reset(&self) -> usize {
        let removed = self.registry.clear();
        *self.catalog.write() = ExchangeCatalog::default();
        self.set_state(ConnectionState::Disconnected);
        removed
    }

    fn ensure_accepting_requests(&self) -> Result<()> {
        let state = self.state();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(LifecycleError::NotConnected { state })
        }
    }

    fn set_state(&self, to: ConnectionState) {
        let from = std::mem::replace(&mut *self.state.write(), to);
        if from != to {
            tracing::debug!("Connection state {} -> {}", from, to);
            self.notify(LifecycleEvent::StateChanged { from, to });
        }
    }

    /// Move to `to` only if the state is still `from`.
    fn transition_from(&self, from: ConnectionState, to: ConnectionState) {
        let changed = {
            let mut state = self.state.write();
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        };
        if changed {
            self.notify(LifecycleEvent::StateChanged { from, to });
        }
    }

    fn notify(&self, event: LifecycleEvent) {
        // No receivers is fine
        let _ = self.notifier.send(event);
    }

    /// Run a broker-facing future under the configured request timeout.
    async fn call<T, E>(
        &self,
        operation: &'static str,
        future: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        E: Into<LifecycleError>,
    {
        match tokio::time::timeout(self.config.request_timeout, future).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(LifecycleError::Timeout {
                operation,
                timeout: self.config.request_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amqp_client::mock::{MockBrokerClient, MockCall};
    use amqp_client::{BrokerError, ExchangeDescriptor, ExchangeMessage, SubscriptionKey};
    use amqp_registry::RegistryError;

    fn noop_handler() -> MessageHandler {
        Arc::new(|_: &ExchangeMessage| {})
    }

    fn broker_exchanges() -> Vec<ExchangeDescriptor> {
        vec![
            ExchangeDescriptor::new("/", ExchangeType::Direct),
            ExchangeDescriptor::new("orders", ExchangeType::Direct),
            ExchangeDescriptor::new("logs", ExchangeType::Topic),
        ]
    }

    fn setup() -> (Arc<MockBrokerClient>, ConnectionLifecycle) {
        let client = Arc::new(MockBrokerClient::new(broker_exchanges()));
        let lifecycle = ConnectionLifecycle::new(client.clone()).unwrap();
        (client, lifecycle)
    }

    /// Feed every pending broker event to the lifecycle.
    async fn pump(lifecycle: &ConnectionLifecycle, rx: &mut broadcast::Receiver<BrokerEvent>) {
        while let Ok(event) = rx.try_recv() {
            lifecycle.handle_event(event).await;
        }
    }

    async fn connected() -> (
        Arc<MockBrokerClient>,
        ConnectionLifecycle,
        broadcast::Receiver<BrokerEvent>,
    ) {
        let (client, lifecycle) = setup();
        let mut rx = client.events();
        lifecycle.connect(&ConnectionConfig::default()).await.unwrap();
        pump(&lifecycle, &mut rx).await;
        (client, lifecycle, rx)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (_client, lifecycle) = setup();
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert!(lifecycle.subscriptions().is_empty());
        assert!(lifecycle.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_connect_caches_exchanges_without_default() {
        let (_client, lifecycle, _rx) = connected().await;

        assert_eq!(lifecycle.state(), ConnectionState::Connected);
        assert_eq!(lifecycle.exchanges().names(), vec!["orders", "logs"]);
        assert_eq!(lifecycle.resolve_exchange_type("logs"), ExchangeType::Topic);
        assert_eq!(lifecycle.resolve_exchange_type("/"), ExchangeType::Direct);
    }

    #[tokio::test]
    async fn test_connect_notifications() {
        let (client, lifecycle) = setup();
        let mut rx = client.events();
        let mut notifications = lifecycle.watch();

        lifecycle.connect(&ConnectionConfig::default()).await.unwrap();
        pump(&lifecycle, &mut rx).await;

        assert_eq!(
            notifications.try_recv().unwrap(),
            LifecycleEvent::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting,
            }
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            LifecycleEvent::StateChanged {
                from: ConnectionState::Connecting,
                to: ConnectionState::Connected,
            }
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            LifecycleEvent::ExchangesUpdated(vec!["orders".to_string(), "logs".to_string()])
        );
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_disconnected() {
        let (client, lifecycle) = setup();
        client.set_fail_connect(true);

        let result = lifecycle.connect(&ConnectionConfig::default()).await;
        assert!(matches!(
            result,
            Err(LifecycleError::Broker(BrokerError::Connect { .. }))
        ));
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let (client, lifecycle) = setup();

        let result = lifecycle.connect(&ConnectionConfig::new("broken", "")).await;
        assert!(matches!(
            result,
            Err(LifecycleError::Broker(BrokerError::InvalidConfig(_)))
        ));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_twice() {
        let (_client, lifecycle, _rx) = connected().await;

        let result = lifecycle.connect(&ConnectionConfig::default()).await;
        assert!(matches!(
            result,
            Err(LifecycleError::AlreadyConnected {
                state: ConnectionState::Connected
            })
        ));
    }

    #[tokio::test]
    async fn test_exchange_query_failure_still_connects() {
        let (client, lifecycle) = setup();
        client.set_fail_list_exchanges(true);
        let mut rx = client.events();

        lifecycle.connect(&ConnectionConfig::default()).await.unwrap();
        pump(&lifecycle, &mut rx).await;

        assert_eq!(lifecycle.state(), ConnectionState::Connected);
        assert!(lifecycle.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_requests_need_connection() {
        let (client, lifecycle) = setup();

        let result = lifecycle.subscribe("orders", "", noop_handler()).await;
        assert!(matches!(
            result,
            Err(LifecycleError::NotConnected {
                state: ConnectionState::Disconnected
            })
        ));

        let result = lifecycle.unsubscribe("orders", "").await;
        assert!(matches!(result, Err(LifecycleError::NotConnected { .. })));

        let result = lifecycle.publish("orders", "", "hello").await;
        assert!(matches!(result, Err(LifecycleError::NotConnected { .. })));

        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_and_duplicate() {
        let (_client, lifecycle, mut rx) = connected().await;

        lifecycle.subscribe("orders", "", noop_handler()).await.unwrap();
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.subscriptions().len(), 1);

        let result = lifecycle.subscribe("orders", "", noop_handler()).await;
        assert!(matches!(
            result,
            Err(LifecycleError::Registry(RegistryError::AlreadyExists { .. }))
        ));
        assert_eq!(lifecycle.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_uses_cached_exchange_type() {
        let (_client, lifecycle, mut rx) = connected().await;

        let sub = lifecycle.subscribe("logs", "app.*", noop_handler()).await.unwrap();
        assert_eq!(sub.exchange_type(), ExchangeType::Topic);

        pump(&lifecycle, &mut rx).await;
        assert!(lifecycle
            .registry()
            .contains(&SubscriptionKey::new("logs", ExchangeType::Topic, "app.*")));
    }

    #[tokio::test]
    async fn test_disconnect_clears_registry_and_exchanges() {
        let (_client, lifecycle, mut rx) = connected().await;

        lifecycle.subscribe("orders", "a", noop_handler()).await.unwrap();
        lifecycle.subscribe("logs", "b", noop_handler()).await.unwrap();
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.subscriptions().len(), 2);

        lifecycle.disconnect().await.unwrap();
        pump(&lifecycle, &mut rx).await;

        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert!(lifecycle.subscriptions().is_empty());
        assert!(lifecycle.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_noop() {
        let (client, lifecycle) = setup();
        lifecycle.disconnect().await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_confirmation_after_disconnect() {
        let (client, lifecycle, mut rx) = connected().await;
        client.set_auto_confirm(false);
        let mut notifications = lifecycle.watch();

        lifecycle.subscribe("x", "k", noop_handler()).await.unwrap();

        // Connection drops before the broker confirms
        client.emit(BrokerEvent::Disconnected);
        pump(&lifecycle, &mut rx).await;

        client.release_confirmations();
        pump(&lifecycle, &mut rx).await;

        assert!(lifecycle.subscriptions().is_empty());
        let rejected = std::iter::from_fn(|| notifications.try_recv().ok())
            .any(|event| matches!(event, LifecycleEvent::ConfirmationRejected(_)));
        assert!(rejected);
    }

    #[tokio::test]
    async fn test_stale_confirmation_after_reconnect() {
        let (client, lifecycle, mut rx) = connected().await;
        client.set_auto_confirm(false);

        lifecycle.subscribe("orders", "", noop_handler()).await.unwrap();
        client.emit(BrokerEvent::Disconnected);
        pump(&lifecycle, &mut rx).await;

        lifecycle.connect(&ConnectionConfig::default()).await.unwrap();
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.state(), ConnectionState::Connected);

        client.release_confirmations();
        pump(&lifecycle, &mut rx).await;
        assert!(lifecycle.subscriptions().is_empty());

        // The identity can be subscribed again in the new connection
        client.set_auto_confirm(true);
        lifecycle.subscribe("orders", "", noop_handler()).await.unwrap();
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnecting_and_blocked_keep_registry() {
        let (client, lifecycle, mut rx) = connected().await;

        lifecycle.subscribe("orders", "", noop_handler()).await.unwrap();
        pump(&lifecycle, &mut rx).await;

        client.emit(BrokerEvent::Blocked);
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.state(), ConnectionState::Blocked);
        assert_eq!(lifecycle.subscriptions().len(), 1);

        client.emit(BrokerEvent::Reconnecting);
        pump(&lifecycle, &mut rx).await;
        assert_eq!(lifecycle.state(), ConnectionState::Reconnecting);
        assert_eq!(lifecycle.subscriptions().len(), 1);

        let result = lifecycle.subscribe("orders", "other", noop_handler()).await;
        assert!(matches!(result, Err(LifecycleError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_lost_events_reset_connection() {
        let (client, lifecycle, mut rx) = connected().await;
        client.set_auto_confirm(false);
        let mut notifications = lifecycle.watch();

        lifecycle.subscribe("orders", "", noop_handler()).await.unwrap();
        let epoch = lifecycle.registry().epoch();

        lifecycle.handle_lost_events(7);

        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
        assert_eq!(lifecycle.registry().epoch(), epoch.next());
        assert_eq!(lifecycle.registry().pending_count(), 0);
        assert!(lifecycle.exchanges().is_empty());

        let lost = std::iter::from_fn(|| notifications.try_recv().ok())
            .any(|event| event == LifecycleEvent::EventsLost { skipped: 7 });
        assert!(lost);

        // The held confirmation belongs to the abandoned epoch
        client.release_confirmations();
        pump(&lifecycle, &mut rx).await;
        assert!(lifecycle.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_ignored_while_disconnected() {
        let (_client, lifecycle) = setup();

        lifecycle.handle_event(BrokerEvent::Blocked).await;
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (client, lifecycle, mut rx) = connected().await;

        lifecycle.subscribe("orders", "eu", noop_handler()).await.unwrap();
        pump(&lifecycle, &mut rx).await;

        let removed = lifecycle.unsubscribe("orders", "eu").await.unwrap();
        assert_eq!(removed.routing_key(), "eu");
        assert!(lifecycle.subscriptions().is_empty());

        // Confirmation for the already removed entry changes nothing
        pump(&lifecycle, &mut rx).await;
        assert!(lifecycle.subscriptions().is_empty());

        let result = lifecycle.unsubscribe("orders", "eu").await;
        assert!(matches!(
            result,
            Err(LifecycleError::Registry(RegistryError::NotFound { .. }))
        ));
        assert_eq!(
            client.call_count(|call| matches!(call, MockCall::Unsubscribe(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_publish_validation() {
        let (client, lifecycle, _rx) = connected().await;

        let result = lifecycle.publish("", "key", "hello").await;
        assert!(matches!(
            result,
            Err(LifecycleError::Validation {
                field: "Exchange Name"
            })
        ));

        let result = lifecycle.publish("orders", "key", "").await;
        assert!(matches!(
            result,
            Err(LifecycleError::Validation { field: "Message" })
        ));

        lifecycle.publish("orders", "key", "hello").await.unwrap();
        assert_eq!(
            client.call_count(|call| matches!(call, MockCall::Publish { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_publish_failure_is_typed() {
        let (client, lifecycle, _rx) = connected().await;
        client.set_fail_publish(true);

        let result = lifecycle.publish("orders", "", "hello").await;
        assert!(matches!(
            result,
            Err(LifecycleError::Broker(BrokerError::Publish { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let client = Arc::new(MockBrokerClient::default());
        let result = ConnectionLifecycle::with_config(
            client,
            LifecycleConfig::new().with_max_subscriptions(0),
        );
        assert!(matches!(result, Err(LifecycleError::Configuration(_))));
    }
}
