//! Events raised by a broker client.

use crate::subscription::ExchangeSubscription;

/// Notifications from the broker client.
///
/// Delivered over the broadcast channel returned by
/// [`BrokerClient::events`](crate::BrokerClient::events).
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// The connection to the broker is established.
    Connected,

    /// The connection to the broker is closed.
    Disconnected,

    /// The connection dropped and the client is trying to re-establish it.
    Reconnecting,

    /// The broker has blocked the connection (resource alarm).
    Blocked,

    /// The broker applied a subscribe request.
    SubscriptionConfirmed(ExchangeSubscription),

    /// The broker applied an unsubscribe request.
    UnsubscriptionConfirmed(ExchangeSubscription),
}

impl BrokerEvent {
    /// Short name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BrokerEvent::Connected => "connected",
            BrokerEvent::Disconnected => "disconnected",
            BrokerEvent::Reconnecting => "reconnecting",
            BrokerEvent::Blocked => "blocked",
            BrokerEvent::SubscriptionConfirmed(_) => "subscription_confirmed",
            BrokerEvent::UnsubscriptionConfirmed(_) => "unsubscription_confirmed",
        }
    }
}
