//! # amqp-registry
//!
//! Local registry of AMQP exchange subscriptions, kept consistent with the
//! broker across connect / disconnect / reconnect cycles.
//!
//! ## Overview
//!
//! - **Identity**: a subscription is identified by exchange name, exchange
//!   type and routing key; the registry never holds two entries with the same
//!   identity.
//! - **Confirmation-driven**: subscribe requests are sent to the broker and the
//!   entry is only added when the broker confirms it.
//! - **Epochs**: clearing the registry starts a new connection epoch, and
//!   confirmations from an earlier epoch are ignored.
//! - **Type resolution**: exchange types are looked up from the broker's
//!   exchange list rather than chosen by the caller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use amqp_registry::SubscriptionRegistry;
//!
//! let registry = SubscriptionRegistry::new(client, 1000);
//! let pending = registry
//!     .subscribe("orders", "eu", &exchanges, Arc::new(|msg| println!("{:?}", msg)))
//!     .await?;
//!
//! // Later, from the broker's event stream:
//! registry.confirm_subscribed(confirmed);
//! ```

pub mod catalog;
pub mod error;
pub mod registry;

pub use catalog::{lookup_exchange_type, resolve_exchange_type, ExchangeCatalog};
pub use error::{RegistryError, RegistryResult};
pub use registry::{Reconciliation, RegistryStats, SubscriptionRegistry, DEFAULT_MAX_SUBSCRIPTIONS};
