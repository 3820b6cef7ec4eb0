//! Builds bus connectors, stores and the persistence coordinator from
//! configuration. Every handle is constructed here and passed down; nothing
//! below this layer reads configuration or creates its own clients.

use std::sync::Arc;

use anyhow::Context;
use auditoria_core::{
    PersistenceCoordinator,
    bus::{BusConnector, MemoryBus},
    store::{
        DurableStore, FastStore, MemoryFastStore, ObjectDurableStore,
        RedisFastStore,
    },
};
use tracing::info;

use super::config::{
    BusBackend, BusConfig, Config, DurableBackend, DurableStoreConfig,
    FastBackend, FastStoreConfig,
};

/// Which side of the bus a connector is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusClient {
    Gateway,
    Worker,
}

/// Builds the connector for `client`.
///
/// `shared` is used for the memory backend so that both roles of a
/// standalone process see the same log; without it each call gets a private
/// bus.
pub fn bus_connector(
    bus: &BusConfig,
    client: BusClient,
    shared: Option<&MemoryBus>,
) -> anyhow::Result<Arc<dyn BusConnector>> {
    match bus.backend {
        BusBackend::Memory => {
            let memory = shared.cloned().unwrap_or_default();
            let group = match client {
                BusClient::Gateway => bus.producer_client_id.clone(),
                BusClient::Worker => bus.group_id.clone(),
            };
            Ok(Arc::new(memory.connector(group)))
        }
        BusBackend::Kafka => kafka_connector(bus),
    }
}

#[cfg(feature = "kafka")]
fn kafka_connector(bus: &BusConfig) -> anyhow::Result<Arc<dyn BusConnector>> {
    use auditoria_core::bus::kafka::{KafkaConnector, KafkaSettings};

    let settings = KafkaSettings {
        brokers: bus.brokers.clone(),
        producer_client_id: bus.producer_client_id.clone(),
        consumer_client_id: bus.consumer_client_id.clone(),
        group_id: bus.group_id.clone(),
        message_timeout: bus.message_timeout,
        ..KafkaSettings::default()
    };
    info!(brokers = %settings.brokers, "using Kafka event bus");
    Ok(Arc::new(KafkaConnector::new(settings)))
}

#[cfg(not(feature = "kafka"))]
fn kafka_connector(_bus: &BusConfig) -> anyhow::Result<Arc<dyn BusConnector>> {
    anyhow::bail!(
        "the event bus backend is `kafka` (the default when BUS_BACKEND is unset) \
         but this binary was built without the `kafka` feature; rebuild with \
         `--features kafka`, or set BUS_BACKEND=memory / run `auditoria standalone` \
         for a single-process setup"
    )
}

pub async fn fast_store(
    config: &FastStoreConfig,
) -> anyhow::Result<Arc<dyn FastStore>> {
    match config.backend {
        FastBackend::Redis => {
            let store = RedisFastStore::connect(&config.redis_url)
                .await
                .context("failed to connect to the fast store")?;
            info!("fast store using Redis");
            Ok(Arc::new(store))
        }
        FastBackend::Memory => {
            info!("fast store using process memory");
            Ok(Arc::new(MemoryFastStore::new()))
        }
    }
}

pub fn durable_store(
    config: &DurableStoreConfig,
) -> anyhow::Result<Arc<dyn DurableStore>> {
    let store = match config.backend {
        DurableBackend::S3 => ObjectDurableStore::s3(&config.s3_settings()),
        DurableBackend::Fs => {
            ObjectDurableStore::filesystem(&config.root.to_string_lossy())
        }
        DurableBackend::Memory => ObjectDurableStore::memory(),
    }
    .context("failed to initialise the durable store")?;
    Ok(Arc::new(store))
}

pub async fn persistence_coordinator(
    config: &Config,
) -> anyhow::Result<PersistenceCoordinator> {
    let fast = fast_store(&config.fast_store).await?;
    let durable = durable_store(&config.durable_store)?;
    Ok(PersistenceCoordinator::new(fast, durable)
        .with_log_ids(config.persistence.log_id.generator())
        .with_write_policy(config.persistence.write_policy())
        .with_object_prefix(config.durable_store.prefix.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditoria_config::{ConfigLoader, sources::EnvConfig};
    use auditoria_core::bus::{BusProducer, BusSubscription};
    use auditoria_model::{AuditEvent, encode};

    fn memory_config() -> Config {
        let env = EnvConfig {
            bus_backend: Some("memory".into()),
            fast_store_backend: Some("memory".into()),
            durable_store_backend: Some("memory".into()),
            ..EnvConfig::default()
        };
        ConfigLoader::new()
            .load_with_env(env, false)
            .unwrap()
            .config
    }

    #[tokio::test]
    async fn shared_memory_bus_connects_both_roles() {
        let config = memory_config();
        let memory = MemoryBus::new();
        let gateway =
            bus_connector(&config.bus, BusClient::Gateway, Some(&memory)).unwrap();
        let worker =
            bus_connector(&config.bus, BusClient::Worker, Some(&memory)).unwrap();

        let producer = gateway.connect_producer().await.unwrap();
        let event = AuditEvent::new("alice", "login", AuditEvent::now());
        producer
            .append(&config.bus.topic, encode(&event))
            .await
            .unwrap();

        let mut subscription =
            worker.subscribe(&config.bus.topic, true).await.unwrap();
        let message = subscription.next_message().await.unwrap().unwrap();
        assert_eq!(message.offset, 0);
        assert_eq!(worker.endpoint(), "memory://grupo-auditoria-logs");
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn kafka_backend_requires_feature() {
        let mut config = memory_config();
        config.bus.backend = BusBackend::Kafka;
        let err = bus_connector(&config.bus, BusClient::Worker, None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("default when BUS_BACKEND is unset"));
        assert!(message.contains("--features kafka"));
        assert!(message.contains("auditoria standalone"));
    }

    #[tokio::test]
    async fn coordinator_builds_from_memory_config() {
        let config = memory_config();
        let coordinator = persistence_coordinator(&config).await.unwrap();
        let event = AuditEvent::new("alice", "login", AuditEvent::now());
        let result = coordinator.persist(event, None).await;
        assert!(result.is_complete());
    }
}
