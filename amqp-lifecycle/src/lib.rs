//! # amqp-lifecycle
//!
//! Ties a broker connection's lifecycle to its subscription registry.
//!
//! ## Overview
//!
//! [`ConnectionLifecycle`] owns a [`SubscriptionRegistry`](amqp_registry::SubscriptionRegistry)
//! and the cached exchange list for one broker connection:
//!
//! - **Connected**: the exchange list is queried and cached (default exchange
//!   excluded) so exchange types can be resolved by name.
//! - **Disconnected**: the registry is cleared and a new connection epoch
//!   begins; confirmations still in flight are rejected when they arrive.
//! - **Reconnecting / Blocked**: only the connection state changes.
//! - **Confirmations**: applied to the registry in arrival order.
//!
//! Subscribe, unsubscribe and publish are refused unless the connection is
//! open, and every broker call is bounded by
//! [`LifecycleConfig::request_timeout`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use amqp_lifecycle::{spawn_event_pump, ConnectionLifecycle};
//!
//! let lifecycle = Arc::new(ConnectionLifecycle::new(client)?);
//! let pump = spawn_event_pump(Arc::clone(&lifecycle));
//!
//! lifecycle.connect(&connection).await?;
//! lifecycle.subscribe("orders", "eu", handler).await?;
//!
//! pump.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pump;
pub mod state;

pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use lifecycle::ConnectionLifecycle;
pub use pump::{spawn_event_pump, EventPump};
pub use state::{ConnectionState, LifecycleEvent};
