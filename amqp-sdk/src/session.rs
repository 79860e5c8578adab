//! Sync-first session over a broker connection
//!
//! [`AmqpSession`] hides the async lifecycle behind a background worker
//! thread. Operations that talk to the broker are sent to the worker and block
//! until it replies; read-only queries go straight to the shared lifecycle.

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use amqp_client::{BrokerClient, ConnectionConfig, ExchangeSubscription, ExchangeType, MessageHandler};
use amqp_lifecycle::{ConnectionLifecycle, ConnectionState, LifecycleConfig};
use amqp_registry::{ExchangeCatalog, RegistryStats};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc as async_mpsc, oneshot};

use crate::error::{Result, SdkError};
use crate::iter::SessionEventIterator;
use crate::profile::ConnectionProfiles;
use crate::worker::{spawn_session_worker, Command};

/// Sync handle to one broker connection and its exchange subscriptions.
///
/// Blocking methods must not be called from inside an async runtime.
///
/// ```rust,ignore
/// let session = AmqpSession::new(client, ConnectionProfiles::load_default()?)?;
/// session.connect("local")?;
///
/// session.subscribe("logs", "app.#", Arc::new(|msg| {
///     println!("{}: {:?}", msg.routing_key, msg.payload_str());
/// }))?;
///
/// for event in session.iter() {
///     println!("{:?}", event);
/// }
/// ```
pub struct AmqpSession {
    lifecycle: Arc<ConnectionLifecycle>,
    profiles: ConnectionProfiles,
    active_profile: RwLock<Option<String>>,
    command_tx: async_mpsc::UnboundedSender<Command>,
    event_rx: Arc<Mutex<mpsc::Receiver<amqp_lifecycle::LifecycleEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AmqpSession {
    /// Create a session with default lifecycle configuration
    pub fn new(client: Arc<dyn BrokerClient>, profiles: ConnectionProfiles) -> Result<Self> {
        Self::with_config(client, profiles, LifecycleConfig::default())
    }

    /// Create a session with custom lifecycle configuration
    ///
    /// Starts the background worker and waits until it is running.
    pub fn with_config(
        client: Arc<dyn BrokerClient>,
        profiles: ConnectionProfiles,
        config: LifecycleConfig,
    ) -> Result<Self> {
        let lifecycle = Arc::new(ConnectionLifecycle::with_config(client, config)?);

        let (command_tx, command_rx) = async_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = spawn_session_worker(
            Arc::clone(&lifecycle),
            command_rx,
            lifecycle.watch(),
            event_tx,
            ready_tx,
        )
        .map_err(|e| SdkError::Runtime(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(SdkError::Runtime(reason)),
            Err(_) => return Err(SdkError::WorkerDisconnected),
        }

        Ok(Self {
            lifecycle,
            profiles,
            active_profile: RwLock::new(None),
            command_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Names of the configured connection profiles
    pub fn connection_names(&self) -> Vec<String> {
        self.profiles.names()
    }

    pub fn profiles(&self) -> &ConnectionProfiles {
        &self.profiles
    }

    /// Name of the profile used by the last successful connect
    pub fn active_profile(&self) -> Option<String> {
        self.active_profile.read().clone()
    }

    /// Connect using the named profile.
    pub fn connect(&self, profile_name: &str) -> Result<()> {
        let config = self.profiles.require(profile_name)?.clone();
        self.connect_with(config)
    }

    /// Connect using the default profile.
    pub fn connect_default(&self) -> Result<()> {
        let config = self
            .profiles
            .default_profile()
            .cloned()
            .ok_or_else(|| SdkError::ProfileNotFound("<default>".to_string()))?;
        self.connect_with(config)
    }

    /// Connect with explicit settings.
    ///
    /// Returns once the broker client accepted the connection; the
    /// [`Connected`](ConnectionState::Connected) state follows on the
    /// notification stream.
    pub fn connect_with(&self, config: ConnectionConfig) -> Result<()> {
        let name = config.name.clone();
        self.request(|reply| Command::Connect { config, reply })?;
        *self.active_profile.write() = Some(name);
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply })
    }

    /// Request a subscription. The returned subscription is pending until the
    /// broker confirms it.
    pub fn subscribe(
        &self,
        exchange_name: &str,
        routing_key: &str,
        handler: MessageHandler,
    ) -> Result<ExchangeSubscription> {
        self.request(|reply| Command::Subscribe {
            exchange_name: exchange_name.to_string(),
            routing_key: routing_key.to_string(),
            handler,
            reply,
        })
    }

    pub fn unsubscribe(&self, exchange_name: &str, routing_key: &str) -> Result<ExchangeSubscription> {
        self.request(|reply| Command::Unsubscribe {
            exchange_name: exchange_name.to_string(),
            routing_key: routing_key.to_string(),
            reply,
        })
    }

    /// Publish a text message.
    pub fn publish(&self, exchange_name: &str, routing_key: &str, message: &str) -> Result<()> {
        self.publish_bytes(exchange_name, routing_key, Bytes::copy_from_slice(message.as_bytes()))
    }

    pub fn publish_bytes(&self, exchange_name: &str, routing_key: &str, payload: Bytes) -> Result<()> {
        self.request(|reply| Command::Publish {
            exchange_name: exchange_name.to_string(),
            routing_key: routing_key.to_string(),
            payload,
            reply,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Confirmed subscriptions
    pub fn subscriptions(&self) -> Vec<ExchangeSubscription> {
        self.lifecycle.subscriptions()
    }

    pub fn subscription_stats(&self) -> RegistryStats {
        self.lifecycle.registry().stats()
    }

    pub fn exchanges(&self) -> ExchangeCatalog {
        self.lifecycle.exchanges()
    }

    pub fn exchange_names(&self) -> Vec<String> {
        self.lifecycle.exchanges().names()
    }

    pub fn resolve_exchange_type(&self, exchange_name: &str) -> ExchangeType {
        self.lifecycle.resolve_exchange_type(exchange_name)
    }

    /// Blocking iterator over lifecycle notifications
    ///
    /// All iterators from one session share a queue.
    pub fn iter(&self) -> SessionEventIterator {
        SessionEventIterator::new(Arc::clone(&self.event_rx))
    }

    /// Stop the background worker, disconnecting first if needed.
    ///
    /// Called automatically on drop. Later broker operations fail with
    /// [`SdkError::WorkerDisconnected`].
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Session worker panicked");
            }
        }
    }

    fn request<T>(&self, build: impl FnOnce(oneshot::Sender<amqp_lifecycle::Result<T>>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(build(reply_tx))
            .map_err(|_| SdkError::WorkerDisconnected)?;

        let result = reply_rx
            .blocking_recv()
            .map_err(|_| SdkError::WorkerDisconnected)?;
        Ok(result?)
    }
}

impl Drop for AmqpSession {
    fn drop(&mut self) {
        tracing::debug!(
            "AmqpSession dropping, {} active subscriptions",
            self.lifecycle.registry().len()
        );
        self.shutdown();
    }
}
