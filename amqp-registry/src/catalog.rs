//! Exchange type resolution against the broker's exchange list.

use amqp_client::{ExchangeDescriptor, ExchangeType};

/// Resolve the type of an exchange by name.
///
/// Scans `descriptors` in order and returns the type of the first exchange
/// named `exchange_name`. Unknown names resolve to [`ExchangeType::Direct`].
pub fn resolve_exchange_type(exchange_name: &str, descriptors: &[ExchangeDescriptor]) -> ExchangeType {
    match lookup_exchange_type(exchange_name, descriptors) {
        Some(exchange_type) => exchange_type,
        None => {
            tracing::debug!(
                "Exchange '{}' not in the known exchange list, defaulting to {}",
                exchange_name,
                ExchangeType::Direct
            );
            ExchangeType::Direct
        }
    }
}

/// Like [`resolve_exchange_type`] but reports a miss as `None`.
pub fn lookup_exchange_type(exchange_name: &str, descriptors: &[ExchangeDescriptor]) -> Option<ExchangeType> {
    descriptors
        .iter()
        .find(|descriptor| descriptor.name == exchange_name)
        .map(|descriptor| descriptor.exchange_type)
}

/// The exchanges a caller may subscribe or publish to.
///
/// Built from the broker's exchange list with the default exchange removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeCatalog {
    exchanges: Vec<ExchangeDescriptor>,
}

impl ExchangeCatalog {
    /// Build a catalog, dropping the default (unnamed or `/`) exchange.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ExchangeDescriptor>) -> Self {
        let exchanges = descriptors
            .into_iter()
            .filter(|descriptor| !descriptor.is_default_exchange())
            .collect();
        Self { exchanges }
    }

    pub fn resolve(&self, exchange_name: &str) -> ExchangeType {
        resolve_exchange_type(exchange_name, &self.exchanges)
    }

    pub fn lookup(&self, exchange_name: &str) -> Option<ExchangeType> {
        lookup_exchange_type(exchange_name, &self.exchanges)
    }

    pub fn contains(&self, exchange_name: &str) -> bool {
        self.lookup(exchange_name).is_some()
    }

    /// Exchange names in broker order.
    pub fn names(&self) -> Vec<String> {
        self.exchanges.iter().map(|d| d.name.clone()).collect()
    }

    pub fn descriptors(&self) -> &[ExchangeDescriptor] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
