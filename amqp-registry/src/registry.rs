//! Exchange subscription registration with duplicate protection
//!
//! This module keeps the local view of active exchange subscriptions for one
//! logical connection and keeps it consistent with the broker. Subscribe
//! requests are fire-and-forget: an entry only becomes active when the broker
//! confirms it. Every request is stamped with the current connection epoch so
//! that confirmations belonging to a connection which has since been torn down
//! are rejected instead of repopulating a cleared registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use amqp_client::{
    BrokerClient, ConnectionEpoch, ExchangeDescriptor, ExchangeSubscription, ExchangeType,
    MessageHandler, SubscriptionKey,
};
use parking_lot::Mutex;

use crate::catalog::resolve_exchange_type;
use crate::error::{RegistryError, RegistryResult};

/// Default capacity of a registry.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 1000;

/// Outcome of applying a broker confirmation to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The registry changed
    Applied,
    /// The registry already reflected the confirmation
    Unchanged,
    /// The confirmation belongs to an earlier connection epoch and was ignored
    Stale,
}

#[derive(Default)]
struct RegistryState {
    /// Confirmed subscriptions
    entries: BTreeMap<SubscriptionKey, ExchangeSubscription>,
    /// Requested but not yet confirmed
    pending: BTreeSet<SubscriptionKey>,
    /// Confirmed entries with an unsubscribe request in flight
    unsubscribing: BTreeSet<SubscriptionKey>,
    epoch: ConnectionEpoch,
}

impl RegistryState {
    fn marks(&mut self, kind: InFlight) -> &mut BTreeSet<SubscriptionKey> {
        match kind {
            InFlight::Subscribe => &mut self.pending,
            InFlight::Unsubscribe => &mut self.unsubscribing,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum InFlight {
    Subscribe,
    Unsubscribe,
}

/// Removes an in-flight mark when dropped while armed.
///
/// Covers both a failed broker request and a request future dropped before
/// completion (e.g. by a caller's timeout). Marks from an earlier epoch were
/// already discarded by `clear()` and are left alone.
struct InFlightGuard<'a> {
    state: &'a Mutex<RegistryState>,
    key: SubscriptionKey,
    epoch: ConnectionEpoch,
    kind: InFlight,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if state.epoch == self.epoch {
            state.marks(self.kind).remove(&self.key);
        }
    }
}

/// Registry of exchange subscriptions for a single connection.
///
/// All state (confirmed entries, pending requests and the connection epoch)
/// sits behind one mutex, so confirmations arriving on the broker's I/O task
/// serialize with caller requests and with `clear()`. The lock is never held
/// across a broker call.
pub struct SubscriptionRegistry {
    client: Arc<dyn BrokerClient>,
    state: Mutex<RegistryState>,
    max_subscriptions: usize,
}

impl SubscriptionRegistry {
    /// Create a new registry issuing requests through `client`.
    pub fn new(client: Arc<dyn BrokerClient>, max_subscriptions: usize) -> Self {
        Self {
            client,
            state: Mutex::new(RegistryState::default()),
            max_subscriptions,
        }
    }

    /// Request a subscription to `exchange_name` with `routing_key`.
    ///
    /// The exchange type is resolved from `descriptors`. On success the
    /// request has been sent and the returned subscription is pending; it is
    /// added to the registry by [`confirm_subscribed`](Self::confirm_subscribed)
    /// when the broker acknowledges it.
    ///
    /// # Errors
    ///
    /// * `RegistryError::Validation` - `exchange_name` is blank
    /// * `RegistryError::AlreadyExists` - the identity is registered or pending
    /// * `RegistryError::RegistryFull` - the registry is at capacity
    /// * `RegistryError::Broker` - the broker client rejected the request
    pub async fn subscribe(
        &self,
        exchange_name: &str,
        routing_key: &str,
        descriptors: &[ExchangeDescriptor],
        handler: MessageHandler,
    ) -> RegistryResult<ExchangeSubscription> {
        let key = identify(exchange_name, routing_key, descriptors)?;

        let subscription = {
            let mut state = self.state.lock();

            if state.entries.contains_key(&key) || state.pending.contains(&key) {
                return Err(RegistryError::AlreadyExists { key });
            }

            if state.entries.len() + state.pending.len() >= self.max_subscriptions {
                return Err(RegistryError::RegistryFull {
                    max_subscriptions: self.max_subscriptions,
                });
            }

            state.pending.insert(key.clone());
            ExchangeSubscription::new(key.clone(), handler, state.epoch)
        };
        let guard = self.in_flight(&subscription, InFlight::Subscribe);

        tracing::debug!("Requesting subscription {} in {}", key, subscription.epoch());

        if let Err(e) = self.client.request_subscribe(subscription.clone()).await {
            tracing::warn!("Subscribe request for {} failed: {}", key, e);
            return Err(e.into());
        }

        // Stays pending until the broker confirms
        guard.disarm();
        Ok(subscription)
    }

    /// Remove the subscription to `exchange_name` with `routing_key`.
    ///
    /// The entry is looked up and marked under the registry lock, so
    /// confirmations that land while the request is in flight cannot disturb
    /// it and a concurrent unsubscribe of the same identity gets `NotFound`
    /// instead of sending a second request. The entry is removed locally once
    /// the broker client accepts the request.
    ///
    /// # Errors
    ///
    /// * `RegistryError::Validation` - `exchange_name` is blank
    /// * `RegistryError::NotFound` - no confirmed subscription has this identity
    /// * `RegistryError::Broker` - the broker client rejected the request
    pub async fn unsubscribe(
        &self,
        exchange_name: &str,
        routing_key: &str,
        descriptors: &[ExchangeDescriptor],
    ) -> RegistryResult<ExchangeSubscription> {
        let key = identify(exchange_name, routing_key, descriptors)?;

        let subscription = {
            let mut state = self.state.lock();

            // An entry already being removed counts as gone
            if state.unsubscribing.contains(&key) {
                return Err(RegistryError::NotFound { key });
            }

            let subscription = state
                .entries
                .get(&key)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound { key: key.clone() })?;
            state.unsubscribing.insert(key.clone());
            subscription
        };
        let _guard = self.in_flight(&subscription, InFlight::Unsubscribe);

        if let Err(e) = self.client.request_unsubscribe(subscription.clone()).await {
            tracing::warn!("Unsubscribe request for {} failed: {}", key, e);
            return Err(e.into());
        }

        let mut state = self.state.lock();
        if state.epoch == subscription.epoch() {
            state.entries.remove(&key);
            tracing::debug!("Removed subscription {}", key);
        }
        drop(state);

        Ok(subscription)
    }

    /// Drop every entry and pending request and start a new connection epoch.
    ///
    /// Returns the number of confirmed entries removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        let pending = state.pending.len();

        state.entries.clear();
        state.pending.clear();
        state.unsubscribing.clear();
        state.epoch = state.epoch.next();

        tracing::debug!(
            "Cleared registry ({} active, {} pending), now in {}",
            removed,
            pending,
            state.epoch
        );

        removed
    }

    /// Apply a subscription confirmation from the broker.
    pub fn confirm_subscribed(&self, subscription: ExchangeSubscription) -> Reconciliation {
        let mut state = self.state.lock();

        if subscription.epoch() != state.epoch {
            tracing::debug!(
                "Ignoring stale confirmation for {} from {} (current {})",
                subscription.key(),
                subscription.epoch(),
                state.epoch
            );
            return Reconciliation::Stale;
        }

        state.pending.remove(subscription.key());

        if state.entries.contains_key(subscription.key()) {
            return Reconciliation::Unchanged;
        }

        tracing::debug!("Subscription {} confirmed", subscription.key());
        state
            .entries
            .insert(subscription.key().clone(), subscription);
        Reconciliation::Applied
    }

    /// Apply an unsubscription confirmation from the broker.
    pub fn confirm_unsubscribed(&self, subscription: &ExchangeSubscription) -> Reconciliation {
        let mut state = self.state.lock();

        if subscription.epoch() != state.epoch {
            return Reconciliation::Stale;
        }

        match state.entries.remove(subscription.key()) {
            Some(_) => {
                tracing::debug!("Unsubscription {} confirmed", subscription.key());
                Reconciliation::Applied
            }
            None => Reconciliation::Unchanged,
        }
    }

    fn in_flight(&self, subscription: &ExchangeSubscription, kind: InFlight) -> InFlightGuard<'_> {
        InFlightGuard {
            state: &self.state,
            key: subscription.key().clone(),
            epoch: subscription.epoch(),
            kind,
            armed: true,
        }
    }

    /// Snapshot of the confirmed subscriptions, ordered by identity.
    pub fn subscriptions(&self) -> Vec<ExchangeSubscription> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Get a confirmed subscription by identity
    pub fn get(&self, key: &SubscriptionKey) -> Option<ExchangeSubscription> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn is_pending(&self, key: &SubscriptionKey) -> bool {
        self.state.lock().pending.contains(key)
    }

    /// Whether an unsubscribe request for `key` is in flight
    pub fn is_unsubscribing(&self, key: &SubscriptionKey) -> bool {
        self.state.lock().unsubscribing.contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of confirmed subscriptions
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Current connection epoch
    pub fn epoch(&self) -> ConnectionEpoch {
        self.state.lock().epoch
    }

    pub fn max_subscriptions(&self) -> usize {
        self.max_subscriptions
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();

        let mut type_breakdown = BTreeMap::new();
        for key in state.entries.keys() {
            *type_breakdown.entry(key.exchange_type).or_insert(0) += 1;
        }

        RegistryStats {
            active: state.entries.len(),
            pending: state.pending.len(),
            max_subscriptions: self.max_subscriptions,
            epoch: state.epoch,
            type_breakdown,
        }
    }
}

/// Validate the caller's fields and build the subscription identity.
fn identify(
    exchange_name: &str,
    routing_key: &str,
    descriptors: &[ExchangeDescriptor],
) -> RegistryResult<SubscriptionKey> {
    if exchange_name.is_empty() {
        return Err(RegistryError::Validation {
            field: "Exchange Name",
        });
    }

    let exchange_type = resolve_exchange_type(exchange_name, descriptors);
    Ok(SubscriptionKey::new(exchange_name, exchange_type, routing_key))
}

/// Statistics about the registry state
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub active: usize,
    pub pending: usize,
    pub max_subscriptions: usize,
    pub epoch: ConnectionEpoch,
    pub type_breakdown: BTreeMap<ExchangeType, usize>,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Registry Stats ({}):", self.epoch)?;
        writeln!(
            f,
            "  Active: {}/{} ({} pending)",
            self.active, self.max_subscriptions, self.pending
        )?;
        writeln!(f, "  Exchange type breakdown:")?;
        for (exchange_type, count) in &self.type_breakdown {
            writeln!(f, "    {}: {}", exchange_type, count)?;
        }
        Ok(())
    }
}
