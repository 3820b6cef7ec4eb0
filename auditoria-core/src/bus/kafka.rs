//! Kafka backend built on librdkafka.
//!
//! Producers use `acks=all`, so an append resolves only once the partition
//! leader and its in-sync replicas have the message. Consumers disable
//! auto-commit; offsets move only through [`BusSubscription::commit`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rdkafka::{
    ClientConfig, Message, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use tracing::debug;

use super::{AppendAck, BusConnector, BusProducer, BusSubscription, RawMessage};
use crate::error::BusError;

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: String,
    pub producer_client_id: String,
    pub consumer_client_id: String,
    pub group_id: String,
    /// How long a produce may wait for acknowledgement.
    pub message_timeout: Duration,
    /// Bound on the metadata fetch used to confirm a connection.
    pub metadata_timeout: Duration,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            producer_client_id: "gateway-producer".to_string(),
            consumer_client_id: "auditoria-consumer".to_string(),
            group_id: "grupo-auditoria-logs".to_string(),
            message_timeout: Duration::from_secs(30),
            metadata_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    settings: KafkaSettings,
}

impl KafkaConnector {
    pub fn new(settings: KafkaSettings) -> Self {
        Self { settings }
    }

    fn connect_error(&self, err: impl ToString) -> BusError {
        BusError::Connect {
            endpoint: self.settings.brokers.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl BusConnector for KafkaConnector {
    fn endpoint(&self) -> String {
        self.settings.brokers.clone()
    }

    async fn connect_producer(&self) -> Result<Arc<dyn BusProducer>, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.settings.brokers)
            .set("client.id", &self.settings.producer_client_id)
            .set("acks", "all")
            .set(
                "message.timeout.ms",
                self.settings.message_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| self.connect_error(e))?;

        let client = producer.clone();
        let timeout = self.settings.metadata_timeout;
        tokio::task::spawn_blocking(move || {
            client.client().fetch_metadata(None, timeout).map(|_| ())
        })
        .await
        .map_err(|e| self.connect_error(e))?
        .map_err(|e| self.connect_error(e))?;

        Ok(Arc::new(KafkaProducer {
            producer,
            queue_timeout: self.settings.message_timeout,
        }))
    }

    async fn subscribe(
        &self,
        topic: &str,
        from_earliest: bool,
    ) -> Result<Box<dyn BusSubscription>, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.settings.brokers)
            .set("client.id", &self.settings.consumer_client_id)
            .set("group.id", &self.settings.group_id)
            .set("enable.auto.commit", "false")
            .set(
                "auto.offset.reset",
                if from_earliest { "earliest" } else { "latest" },
            )
            .create()
            .map_err(|e| self.connect_error(e))?;
        let consumer = Arc::new(consumer);

        let client = Arc::clone(&consumer);
        let check_topic = topic.to_string();
        let timeout = self.settings.metadata_timeout;
        tokio::task::spawn_blocking(move || {
            client.fetch_metadata(Some(&check_topic), timeout).map(|_| ())
        })
        .await
        .map_err(|e| self.connect_error(e))?
        .map_err(|e| self.connect_error(e))?;

        consumer.subscribe(&[topic]).map_err(|e| BusError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    queue_timeout: Duration,
}

#[async_trait]
impl BusProducer for KafkaProducer {
    async fn append(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<AppendAck, BusError> {
        let record: FutureRecord<'_, (), [u8]> =
            FutureRecord::to(topic).payload(payload.as_slice());
        match self
            .producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok((partition, offset)) => Ok(AppendAck { partition, offset }),
            Err((err, _message)) => Err(classify(topic, err)),
        }
    }
}

fn classify(topic: &str, err: KafkaError) -> BusError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::MessageTimedOut,
        ) => BusError::Disconnected(err.to_string()),
        _ => BusError::Append {
            topic: topic.to_string(),
            reason: err.to_string(),
        },
    }
}

struct KafkaSubscription {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl BusSubscription for KafkaSubscription {
    async fn next_message(&mut self) -> Option<Result<RawMessage, BusError>> {
        let received = match self.consumer.recv().await {
            Ok(message) => Ok(RawMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
            Err(err) => Err(BusError::Disconnected(err.to_string())),
        };
        Some(received)
    }

    async fn commit(&mut self, message: &RawMessage) -> Result<(), BusError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| BusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))?;
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "kafka offset committed"
        );
        Ok(())
    }
}
