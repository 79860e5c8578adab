//! # amqp-sdk
//!
//! A sync-first SDK for subscribing to AMQP exchanges.
//!
//! ## Overview
//!
//! [`AmqpSession`] manages one broker connection chosen from a set of named
//! [`ConnectionProfiles`]. It keeps a registry of exchange subscriptions that
//! follows the connection: subscriptions are registered when the broker
//! confirms them and dropped when the connection is lost.
//!
//! All async work runs on a background worker thread, so callers never need
//! async/await.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use amqp_sdk::prelude::*;
//!
//! let profiles = ConnectionProfiles::load_default()?;
//! let session = AmqpSession::new(client, profiles)?;
//!
//! session.connect("local")?;
//! session.subscribe("orders", "eu", Arc::new(|msg: &ExchangeMessage| {
//!     println!("{:?}", msg.payload_str());
//! }))?;
//! session.publish("orders", "eu", "hello")?;
//!
//! for event in session.iter() {
//!     if let LifecycleEvent::StateChanged { to: ConnectionState::Disconnected, .. } = event {
//!         break;
//!     }
//! }
//! ```
//!
//! ## Logging
//!
//! The SDK logs through `tracing`. See [`logging`] to install a subscriber
//! driven by `AMQP_LOG_MODE` / `AMQP_LOG_LEVEL`.

mod error;
mod iter;
pub mod logging;
mod profile;
mod session;
mod worker;

pub use error::{Result, SdkError};
pub use iter::{SessionEventIterator, TimeoutIterator, TryIterator};
pub use profile::{ConnectionProfiles, PROFILES_FILE_NAME};
pub use session::AmqpSession;

pub use amqp_client::{
    BrokerClient, BrokerError, BrokerEvent, ConnectionConfig, ExchangeDescriptor, ExchangeMessage,
    ExchangeSubscription, ExchangeType, MessageHandler, SubscriptionKey,
};
pub use amqp_lifecycle::{ConnectionState, LifecycleConfig, LifecycleError, LifecycleEvent};
pub use amqp_registry::{ExchangeCatalog, RegistryError, RegistryStats};

#[cfg(feature = "test-support")]
pub use amqp_client::mock;

/// Common imports
pub mod prelude {
    pub use crate::{
        AmqpSession, ConnectionConfig, ConnectionProfiles, ConnectionState, ExchangeMessage,
        ExchangeType, LifecycleEvent, SdkError,
    };
}
