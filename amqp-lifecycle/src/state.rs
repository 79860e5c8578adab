//! Connection states and the notifications published on transitions.

use amqp_client::SubscriptionKey;

/// State of the broker connection
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq)]
pub enum ConnectionState {
    /// No connection (initial state)
    #[default]
    Disconnected,
    /// Connect requested, waiting for the broker
    Connecting,
    /// Connection open
    Connected,
    /// Connection dropped, the client is re-establishing it
    Reconnecting,
    /// Connection open but blocked by the broker
    Blocked,
}

impl ConnectionState {
    /// Whether subscribe, unsubscribe and publish requests may be issued.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Blocked)
    }

    /// Whether a connection is open or being opened.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Notifications published by the lifecycle coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Connection state changed
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The cached exchange list was replaced (names, default exchange excluded)
    ExchangesUpdated(Vec<String>),

    /// A subscription was confirmed and registered
    Subscribed(SubscriptionKey),

    /// A subscription was confirmed removed
    Unsubscribed(SubscriptionKey),

    /// A confirmation from an earlier connection was ignored
    ConfirmationRejected(SubscriptionKey),

    /// Broker events were dropped before they could be applied; the
    /// connection was treated as lost
    EventsLost { skipped: u64 },
}
