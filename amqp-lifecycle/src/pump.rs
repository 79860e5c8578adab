//! Background task feeding broker events into the lifecycle coordinator
//!
//! The broker client raises events on its own I/O context. The pump drains
//! them in order on a tokio task so that [`ConnectionLifecycle::handle_event`]
//! never runs concurrently with itself. Falling behind the client's event
//! buffer loses events, which is handled by
//! [`ConnectionLifecycle::handle_lost_events`].

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use amqp_client::BrokerEvent;

use crate::lifecycle::ConnectionLifecycle;

/// Handle to a running event pump
pub struct EventPump {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl EventPump {
    /// Stop the pump and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("Event pump task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn a task that applies every broker event to `lifecycle`.
///
/// The event subscription is taken before this function returns, so no event
/// raised afterwards is missed. Must be called from within a tokio runtime.
pub fn spawn_event_pump(lifecycle: Arc<ConnectionLifecycle>) -> EventPump {
    let events = lifecycle.client().events();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(run_event_pump(lifecycle, events, shutdown_rx));

    EventPump {
        shutdown_tx: Some(shutdown_tx),
        handle,
    }
}

async fn run_event_pump(
    lifecycle: Arc<ConnectionLifecycle>,
    mut events: broadcast::Receiver<BrokerEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    tracing::debug!("Event pump started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("Event pump received shutdown signal");
                break;
            }

            event = events.recv() => {
                match event {
                    Ok(event) => lifecycle.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event pump lagged, {} broker events dropped", skipped);
                        lifecycle.handle_lost_events(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Broker event stream closed, stopping event pump");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("Event pump stopped");
}
