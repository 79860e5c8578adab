//! Property-based tests for the subscription registry
//!
//! Random interleavings of subscribe, unsubscribe, confirmation delivery and
//! clear must leave the registry matching a simple model: confirmed identities
//! are unique and nothing requested before a clear survives it.

use std::collections::BTreeSet;
use std::sync::Arc;

use amqp_client::mock::MockBrokerClient;
use amqp_client::{
    BrokerClient, BrokerEvent, ConnectionConfig, ExchangeDescriptor, ExchangeMessage, ExchangeType,
    SubscriptionKey,
};
use amqp_registry::{RegistryError, SubscriptionRegistry};
use proptest::prelude::*;

const EXCHANGES: [&str; 3] = ["orders", "logs", "audit"];
const ROUTING_KEYS: [&str; 3] = ["", "eu", "us"];

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize, usize),
    Unsubscribe(usize, usize),
    DeliverConfirmations,
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..EXCHANGES.len(), 0..ROUTING_KEYS.len()).prop_map(|(e, r)| Op::Subscribe(e, r)),
        2 => (0..EXCHANGES.len(), 0..ROUTING_KEYS.len()).prop_map(|(e, r)| Op::Unsubscribe(e, r)),
        2 => Just(Op::DeliverConfirmations),
        1 => Just(Op::Clear),
    ]
}

fn descriptors() -> Vec<ExchangeDescriptor> {
    vec![
        ExchangeDescriptor::new("orders", ExchangeType::Direct),
        ExchangeDescriptor::new("logs", ExchangeType::Topic),
        ExchangeDescriptor::new("audit", ExchangeType::Fanout),
    ]
}

fn key_for(exchange: usize, routing_key: usize) -> SubscriptionKey {
    let exchange_name = EXCHANGES[exchange];
    let exchange_type = descriptors()
        .into_iter()
        .find(|d| d.name == exchange_name)
        .map(|d| d.exchange_type)
        .unwrap_or_default();
    SubscriptionKey::new(exchange_name, exchange_type, ROUTING_KEYS[routing_key])
}

async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let client = Arc::new(MockBrokerClient::new(descriptors()));
    client.connect(&ConnectionConfig::default()).await.unwrap();
    let mut rx = client.events();
    let registry = SubscriptionRegistry::new(client.clone(), 100);

    let mut confirmed: BTreeSet<SubscriptionKey> = BTreeSet::new();
    let mut pending: BTreeSet<SubscriptionKey> = BTreeSet::new();

    for op in ops {
        match op {
            Op::Subscribe(e, r) => {
                let key = key_for(e, r);
                let result = registry
                    .subscribe(
                        EXCHANGES[e],
                        ROUTING_KEYS[r],
                        &descriptors(),
                        Arc::new(|_: &ExchangeMessage| {}),
                    )
                    .await;

                if confirmed.contains(&key) || pending.contains(&key) {
                    prop_assert!(
                        matches!(result, Err(RegistryError::AlreadyExists { .. })),
                        "expected AlreadyExists, got {:?}",
                        result
                    );
                } else {
                    prop_assert!(result.is_ok());
                    pending.insert(key);
                }
            }
            Op::Unsubscribe(e, r) => {
                let key = key_for(e, r);
                let result = registry
                    .unsubscribe(EXCHANGES[e], ROUTING_KEYS[r], &descriptors())
                    .await;

                if confirmed.remove(&key) {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(
                        matches!(result, Err(RegistryError::NotFound { .. })),
                        "expected NotFound, got {:?}",
                        result
                    );
                }
            }
            Op::DeliverConfirmations => {
                while let Ok(event) = rx.try_recv() {
                    match event {
                        BrokerEvent::SubscriptionConfirmed(sub) => {
                            registry.confirm_subscribed(sub);
                        }
                        BrokerEvent::UnsubscriptionConfirmed(sub) => {
                            registry.confirm_unsubscribed(&sub);
                        }
                        _ => {}
                    }
                }
                confirmed.extend(std::mem::take(&mut pending));
            }
            Op::Clear => {
                registry.clear();
                confirmed.clear();
                pending.clear();
            }
        }

        let actual: Vec<SubscriptionKey> = registry
            .subscriptions()
            .iter()
            .map(|sub| sub.key().clone())
            .collect();
        let unique: BTreeSet<SubscriptionKey> = actual.iter().cloned().collect();

        prop_assert_eq!(actual.len(), unique.len());
        prop_assert_eq!(&unique, &confirmed);
        prop_assert_eq!(registry.pending_count(), pending.len());
    }

    Ok(())
}

proptest! {
    #[test]
    fn registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run_ops(ops))?;
    }
}
