//! Background worker thread for broker operations
//!
//! Spawns a thread with its own tokio runtime that owns the event pump and
//! executes the async lifecycle operations on behalf of the sync
//! [`AmqpSession`](crate::AmqpSession).

use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use amqp_client::{ConnectionConfig, ExchangeSubscription, MessageHandler};
use amqp_lifecycle::{spawn_event_pump, ConnectionLifecycle, LifecycleEvent};
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc as async_mpsc, oneshot};

type Reply<T> = oneshot::Sender<amqp_lifecycle::Result<T>>;

/// Commands sent from the sync session to the background worker
pub(crate) enum Command {
    Connect {
        config: ConnectionConfig,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Subscribe {
        exchange_name: String,
        routing_key: String,
        handler: MessageHandler,
        reply: Reply<ExchangeSubscription>,
    },
    Unsubscribe {
        exchange_name: String,
        routing_key: String,
        reply: Reply<ExchangeSubscription>,
    },
    Publish {
        exchange_name: String,
        routing_key: String,
        payload: Bytes,
        reply: Reply<()>,
    },
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Disconnect { .. } => "disconnect",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::Publish { .. } => "publish",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Spawn the worker thread.
///
/// `ready_tx` receives `Ok(())` once the runtime is up and the event pump is
/// running, or the runtime error otherwise.
pub(crate) fn spawn_session_worker(
    lifecycle: Arc<ConnectionLifecycle>,
    command_rx: async_mpsc::UnboundedReceiver<Command>,
    notifications: broadcast::Receiver<LifecycleEvent>,
    event_tx: mpsc::Sender<LifecycleEvent>,
    ready_tx: mpsc::Sender<Result<(), String>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("amqp-session".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for session worker: {}", e);
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            rt.block_on(run_worker(
                lifecycle,
                command_rx,
                notifications,
                event_tx,
                ready_tx,
            ));
        })
}

async fn run_worker(
    lifecycle: Arc<ConnectionLifecycle>,
    mut command_rx: async_mpsc::UnboundedReceiver<Command>,
    notifications: broadcast::Receiver<LifecycleEvent>,
    event_tx: mpsc::Sender<LifecycleEvent>,
    ready_tx: mpsc::Sender<Result<(), String>>,
) {
    let pump = spawn_event_pump(Arc::clone(&lifecycle));
    let forwarder = tokio::spawn(forward_notifications(notifications, event_tx));

    tracing::info!("Session worker started");
    let _ = ready_tx.send(Ok(()));

    while let Some(command) = command_rx.recv().await {
        tracing::debug!("Worker: {}", command.name());

        match command {
            Command::Connect { config, reply } => {
                let _ = reply.send(lifecycle.connect(&config).await);
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(lifecycle.disconnect().await);
            }
            Command::Subscribe {
                exchange_name,
                routing_key,
                handler,
                reply,
            } => {
                let result = lifecycle
                    .subscribe(&exchange_name, &routing_key, handler)
                    .await;
                let _ = reply.send(result);
            }
            Command::Unsubscribe {
                exchange_name,
                routing_key,
                reply,
            } => {
                let result = lifecycle.unsubscribe(&exchange_name, &routing_key).await;
                let _ = reply.send(result);
            }
            Command::Publish {
                exchange_name,
                routing_key,
                payload,
                reply,
            } => {
                let result = lifecycle
                    .publish(&exchange_name, &routing_key, payload)
                    .await;
                let _ = reply.send(result);
            }
            Command::Shutdown => {
                tracing::info!("Worker received shutdown command");
                break;
            }
        }
    }

    if lifecycle.state().is_active() {
        if let Err(e) = lifecycle.disconnect().await {
            tracing::warn!("Disconnect during shutdown failed: {}", e);
        }
    }

    pump.shutdown().await;
    forwarder.abort();

    tracing::info!("Session worker shut down");
}

/// Copy lifecycle notifications onto the sync channel behind the iterator.
async fn forward_notifications(
    mut notifications: broadcast::Receiver<LifecycleEvent>,
    event_tx: mpsc::Sender<LifecycleEvent>,
) {
    loop {
        match notifications.recv().await {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    tracing::debug!("Session event receiver dropped, stopping forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Session event forwarder lagged, {} notifications dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
