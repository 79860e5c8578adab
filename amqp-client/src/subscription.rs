//! Exchange subscription types shared between the registry and broker clients.

use std::sync::Arc;

use bytes::Bytes;

use crate::types::ExchangeType;

/// Counter identifying one connection lifetime.
///
/// The registry advances the epoch every time it is cleared. Requests and
/// confirmations stamped with an older epoch belong to a connection that no
/// longer exists.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConnectionEpoch(u64);

impl ConnectionEpoch {
    /// Create an epoch with the given value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw epoch value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The epoch that follows this one
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for ConnectionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch-{}", self.0)
    }
}

/// Identity of a subscription: exchange name, exchange type and routing key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriptionKey {
    /// Name of the exchange
    pub exchange_name: String,
    /// Type of the exchange
    pub exchange_type: ExchangeType,
    /// Routing key, possibly empty
    pub routing_key: String,
}

impl SubscriptionKey {
    /// Create a new subscription key
    pub fn new(
        exchange_name: impl Into<String>,
        exchange_type: ExchangeType,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            exchange_type,
            routing_key: routing_key.into(),
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} ({})",
            self.exchange_name, self.routing_key, self.exchange_type
        )
    }
}

/// A message delivered from an exchange to a subscription handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeMessage {
    /// Exchange the message was published to
    pub exchange_name: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Raw message body
    pub payload: Bytes,
}

impl ExchangeMessage {
    pub fn new(
        exchange_name: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            payload: payload.into(),
        }
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Callback invoked by the broker client for each message matching a subscription.
pub type MessageHandler = Arc<dyn Fn(&ExchangeMessage) + Send + Sync>;

/// An exchange subscription.
///
/// Cloning is cheap; the handler is shared. Two subscriptions describe the same
/// subscription when their [`SubscriptionKey`]s are equal; the handler and the
/// epoch do not take part in identity.
#[derive(Clone)]
pub struct ExchangeSubscription {
    key: SubscriptionKey,
    handler: MessageHandler,
    epoch: ConnectionEpoch,
}

impl ExchangeSubscription {
    /// Create a subscription in the given connection epoch.
    pub fn new(key: SubscriptionKey, handler: MessageHandler, epoch: ConnectionEpoch) -> Self {
        Self {
            key,
            handler,
            epoch,
        }
    }

    /// Create a subscription whose handler drops every message.
    pub fn without_handler(key: SubscriptionKey, epoch: ConnectionEpoch) -> Self {
        Self::new(key, Arc::new(|_: &ExchangeMessage| {}), epoch)
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn exchange_name(&self) -> &str {
        &self.key.exchange_name
    }

    pub fn exchange_type(&self) -> ExchangeType {
        self.key.exchange_type
    }

    pub fn routing_key(&self) -> &str {
        &self.key.routing_key
    }

    /// Connection epoch the subscription was requested in.
    pub fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    /// Whether a message published with `exchange_name`/`routing_key` is
    /// routed to this subscription.
    ///
    /// Topic patterns are matched segment-wise with `*` (one word) and `#`
    /// (zero or more words).
    pub fn matches(&self, exchange_name: &str, routing_key: &str) -> bool {
        if self.key.exchange_name != exchange_name {
            return false;
        }

        match self.key.exchange_type {
            ExchangeType::Fanout | ExchangeType::Headers => true,
            ExchangeType::Direct => self.key.routing_key == routing_key,
            ExchangeType::Topic => topic_matches(&self.key.routing_key, routing_key),
        }
    }

    /// Invoke the handler with a message.
    pub fn deliver(&self, message: &ExchangeMessage) {
        (self.handler)(message);
    }
}

impl std::fmt::Debug for ExchangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSubscription")
            .field("key", &self.key)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| match_words(rest, &words[skip..])),
        Some((&segment, rest)) => match words.split_first() {
            Some((word, remaining)) if segment == "*" || segment == *word => {
                match_words(rest, remaining)
            }
            _ => false,
        },
    }
}
