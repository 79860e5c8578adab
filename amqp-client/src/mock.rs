//! Scriptable in-memory broker client for tests.
//!
//! [`MockBrokerClient`] never touches the network. It raises the same events a
//! real client would, records every call, and can be configured to fail
//! individual operations or to hold confirmations back so tests can replay
//! them out of order.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::client::BrokerClient;
use crate::error::{BrokerError, Result};
use crate::event::BrokerEvent;
use crate::subscription::{ExchangeMessage, ExchangeSubscription, SubscriptionKey};
use crate::types::{ConnectionConfig, ExchangeDescriptor};

/// A call made against the mock, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect(String),
    Disconnect,
    ListExchanges,
    Subscribe(SubscriptionKey),
    Unsubscribe(SubscriptionKey),
    Publish {
        exchange_name: String,
        routing_key: String,
        payload: Bytes,
    },
}

/// In-memory [`BrokerClient`] for tests.
pub struct MockBrokerClient {
    events: broadcast::Sender<BrokerEvent>,
    exchanges: Mutex<Vec<ExchangeDescriptor>>,
    calls: Mutex<Vec<MockCall>>,
    /// Subscriptions the "broker" is currently delivering to
    active: Mutex<Vec<ExchangeSubscription>>,
    /// Requests sent while auto-confirm was off
    held: Mutex<Vec<BrokerEvent>>,
    connected: AtomicBool,
    auto_confirm: AtomicBool,
    should_fail_connect: AtomicBool,
    should_fail_requests: AtomicBool,
    should_fail_publish: AtomicBool,
    should_fail_list_exchanges: AtomicBool,
}

impl MockBrokerClient {
    /// Create a mock broker that reports the given exchanges on connect.
    pub fn new(exchanges: Vec<ExchangeDescriptor>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            exchanges: Mutex::new(exchanges),
            calls: Mutex::new(Vec::new()),
            active: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            auto_confirm: AtomicBool::new(true),
            should_fail_connect: AtomicBool::new(false),
            should_fail_requests: AtomicBool::new(false),
            should_fail_publish: AtomicBool::new(false),
            should_fail_list_exchanges: AtomicBool::new(false),
        }
    }

    /// Confirm subscribe/unsubscribe requests immediately (default) or hold
    /// them until [`release_confirmations`](Self::release_confirmations).
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.auto_confirm.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, should_fail: bool) {
        self.should_fail_connect.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_fail_requests(&self, should_fail: bool) {
        self.should_fail_requests.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, should_fail: bool) {
        self.should_fail_publish.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_fail_list_exchanges(&self, should_fail: bool) {
        self.should_fail_list_exchanges.store(should_fail, Ordering::SeqCst);
    }

    /// Replace the exchanges reported by `list_exchanges`.
    pub fn set_exchanges(&self, exchanges: Vec<ExchangeDescriptor>) {
        *self.exchanges.lock() = exchanges;
    }

    /// Raise an event as if it came from the broker.
    ///
    /// Returns the number of receivers that got it.
    pub fn emit(&self, event: BrokerEvent) -> usize {
        if let BrokerEvent::Disconnected = event {
            self.connected.store(false, Ordering::SeqCst);
            self.active.lock().clear();
        }
        self.events.send(event).unwrap_or(0)
    }

    /// Emit every held confirmation, oldest first.
    pub fn release_confirmations(&self) -> usize {
        let held: Vec<BrokerEvent> = self.held.lock().drain(..).collect();
        let count = held.len();
        for event in held {
            self.apply_confirmation(&event);
            let _ = self.events.send(event);
        }
        count
    }

    /// Number of confirmations currently held back.
    pub fn held_confirmations(&self) -> usize {
        self.held.lock().len()
    }

    /// Route a message to every matching active subscription.
    ///
    /// Returns the number of handlers invoked.
    pub fn deliver(&self, exchange_name: &str, routing_key: &str, payload: impl Into<Bytes>) -> usize {
        let message = ExchangeMessage::new(exchange_name, routing_key, payload);
        let targets: Vec<ExchangeSubscription> = self
            .active
            .lock()
            .iter()
            .filter(|sub| sub.matches(exchange_name, routing_key))
            .cloned()
            .collect();

        for sub in &targets {
            sub.deliver(&message);
        }
        targets.len()
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls matching the predicate.
    pub fn call_count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn ensure_requests_allowed(&self) -> Result<()> {
        self.ensure_connected()?;
        if self.should_fail_requests.load(Ordering::SeqCst) {
            return Err(BrokerError::Request(
                "Mock failure: requests disabled".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_confirmation(&self, event: &BrokerEvent) {
        match event {
            BrokerEvent::SubscriptionConfirmed(sub) => {
                let mut active = self.active.lock();
                if !active.iter().any(|existing| existing.key() == sub.key()) {
                    active.push(sub.clone());
                }
            }
            BrokerEvent::UnsubscriptionConfirmed(sub) => {
                self.active.lock().retain(|existing| existing.key() != sub.key());
            }
            _ => {}
        }
    }

    fn confirm(&self, event: BrokerEvent) {
        if self.auto_confirm.load(Ordering::SeqCst) {
            self.apply_confirmation(&event);
            let _ = self.events.send(event);
        } else {
            self.held.lock().push(event);
        }
    }
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        self.record(MockCall::Connect(config.name.clone()));

        if self.should_fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::Connect {
                address: config.address(),
                reason: "Mock failure: connect disabled".to_string(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(BrokerEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(MockCall::Disconnect);
        self.emit(BrokerEvent::Disconnected);
        Ok(())
    }

    async fn list_exchanges(&self) -> Result<Vec<ExchangeDescriptor>> {
        self.record(MockCall::ListExchanges);
        self.ensure_connected()?;

        if self.should_fail_list_exchanges.load(Ordering::SeqCst) {
            return Err(BrokerError::ExchangeQuery(
                "Mock failure: exchange listing disabled".to_string(),
            ));
        }

        Ok(self.exchanges.lock().clone())
    }

    async fn request_subscribe(&self, subscription: ExchangeSubscription) -> Result<()> {
        self.record(MockCall::Subscribe(subscription.key().clone()));
        self.ensure_requests_allowed()?;
        self.confirm(BrokerEvent::SubscriptionConfirmed(subscription));
        Ok(())
    }

    async fn request_unsubscribe(&self, subscription: ExchangeSubscription) -> Result<()> {
        self.record(MockCall::Unsubscribe(subscription.key().clone()));
        self.ensure_requests_allowed()?;
        self.confirm(BrokerEvent::UnsubscriptionConfirmed(subscription));
        Ok(())
    }

    async fn publish(&self, exchange_name: &str, routing_key: &str, payload: Bytes) -> Result<()> {
        self.record(MockCall::Publish {
            exchange_name: exchange_name.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        });
        self.ensure_connected()?;

        if self.should_fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                exchange_name: exchange_name.to_string(),
                reason: "Mock failure: publish disabled".to_string(),
            });
        }

        self.deliver(exchange_name, routing_key, payload);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }
}
