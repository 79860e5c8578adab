//! # amqp-client
//!
//! The broker-facing contract of the AMQP SDK.
//!
//! This crate does not speak AMQP itself. It defines what the rest of the SDK
//! needs from a broker connection, the [`BrokerClient`] trait and the
//! [`BrokerEvent`]s it raises, together with the exchange and subscription
//! data model both sides share.
//!
//! Enable the `test-support` feature to get [`mock::MockBrokerClient`], an
//! in-memory implementation for tests.

mod client;
mod error;
mod event;
mod subscription;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use client::BrokerClient;
pub use error::{BrokerError, Result};
pub use event::BrokerEvent;
pub use subscription::{
    ConnectionEpoch, ExchangeMessage, ExchangeSubscription, MessageHandler, SubscriptionKey,
};
pub use types::{ConnectionConfig, ExchangeDescriptor, ExchangeType, DEFAULT_EXCHANGE_NAME};
