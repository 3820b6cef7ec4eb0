use std::sync::Arc;

use auditoria_model::{ActionRequest, AuditEvent, ValidationError, encode};
use serde::Serialize;
use tracing::{error, info};

use crate::{
    bus::AppendAck,
    connection::BusConnectionManager,
    error::BusError,
};

pub const PUBLISH_OK_MESSAGE: &str =
    "Evento enviado exitosamente al bus de datos Kafka";
pub const PUBLISH_BUS_ERROR_MESSAGE: &str =
    "Error de conexion con el broker de mensajeria";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishFailure {
    Validation(ValidationError),
    Bus(BusError),
}

/// Structured publish outcome. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub ack: Option<AppendAck>,
    #[serde(skip)]
    pub failure: Option<PublishFailure>,
}

impl PublishResult {
    fn published(ack: AppendAck) -> Self {
        Self {
            success: true,
            message: PUBLISH_OK_MESSAGE.to_string(),
            ack: Some(ack),
            failure: None,
        }
    }

    fn rejected(err: ValidationError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            ack: None,
            failure: Some(PublishFailure::Validation(err)),
        }
    }

    fn bus_failed(err: BusError) -> Self {
        Self {
            success: false,
            message: PUBLISH_BUS_ERROR_MESSAGE.to_string(),
            ack: None,
            failure: Some(PublishFailure::Bus(err)),
        }
    }
}

/// Stamps validated actions and appends them to the audit topic.
///
/// Makes exactly one append attempt per call; reconnection is the
/// connection manager's job.
#[derive(Debug, Clone)]
pub struct Publisher {
    bus: Arc<BusConnectionManager>,
    topic: String,
}

impl Publisher {
    pub fn new(bus: Arc<BusConnectionManager>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(
        &self,
        actor: impl Into<String>,
        action: impl Into<String>,
    ) -> PublishResult {
        self.publish_request(ActionRequest::new(actor, action)).await
    }

    pub async fn publish_request(&self, request: ActionRequest) -> PublishResult {
        let event = match request.into_event(AuditEvent::now()) {
            Ok(event) => event,
            Err(err) => {
                info!(error = %err, "rejected audit action");
                return PublishResult::rejected(err);
            }
        };

        match self.bus.append(&self.topic, encode(&event)).await {
            Ok(ack) => {
                info!(
                    topic = %self.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    accion = %event.action,
                    "audit event published"
                );
                PublishResult::published(ack)
            }
            Err(err) => {
                error!(topic = %self.topic, error = %err, "failed to publish audit event");
                PublishResult::bus_failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::MemoryBus, connection::RetryPolicy};
    use auditoria_model::decode;
    use std::{collections::HashSet, time::Duration};

    async fn connected(bus: &MemoryBus) -> Publisher {
        let manager = Arc::new(BusConnectionManager::new(
            Arc::new(bus.connector("gateway")),
            RetryPolicy::fixed(1, Duration::from_millis(1)),
        ));
        manager.connect_producer().await.unwrap();
        Publisher::new(manager, "logs-auditoria")
    }

    #[tokio::test]
    async fn empty_fields_are_rejected_without_append() {
        let bus = MemoryBus::new();
        let publisher = connected(&bus).await;

        for (actor, action) in [("", "x"), ("x", "")] {
            let result = publisher.publish(actor, action).await;
            assert!(!result.success);
            assert!(matches!(
                result.failure,
                Some(PublishFailure::Validation(ValidationError::EmptyField(_)))
            ));
        }
        assert!(bus.messages("logs-auditoria").is_empty());
    }

    #[tokio::test]
    async fn publish_appends_one_encoded_event() {
        let bus = MemoryBus::new();
        let publisher = connected(&bus).await;

        let result = publisher.publish("alice", "login").await;

        assert!(result.success);
        assert_eq!(result.message, PUBLISH_OK_MESSAGE);
        let messages = bus.messages("logs-auditoria");
        assert_eq!(messages.len(), 1);
        let event = decode(&messages[0].payload).unwrap();
        assert_eq!(event.actor, "alice");
        assert_eq!(event.action, "login");
        assert_eq!(result.ack.map(|ack| ack.offset), Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_each_get_their_own_offset() {
        const CALLERS: usize = 64;
        let bus = MemoryBus::new();
        let publisher = connected(&bus).await;

        let mut calls = tokio::task::JoinSet::new();
        for i in 0..CALLERS {
            let publisher = publisher.clone();
            calls.spawn(async move {
                publisher.publish(format!("user-{i}"), "login").await
            });
        }

        let mut offsets = HashSet::new();
        while let Some(joined) = calls.join_next().await {
            let result = joined.unwrap();
            assert!(result.success);
            offsets.insert(result.ack.map(|ack| ack.offset).unwrap());
        }

        assert_eq!(offsets.len(), CALLERS);
        let actors: HashSet<_> = bus
            .messages("logs-auditoria")
            .iter()
            .map(|message| decode(&message.payload).unwrap().actor)
            .collect();
        assert_eq!(actors.len(), CALLERS);
    }

    #[tokio::test]
    async fn bus_failure_becomes_structured_result() {
        let bus = MemoryBus::new();
        let manager = Arc::new(BusConnectionManager::new(
            Arc::new(bus.connector("gateway")),
            RetryPolicy::fixed(1, Duration::from_millis(1)),
        ));
        let publisher = Publisher::new(manager, "logs-auditoria");

        let result = publisher.publish("alice", "login").await;

        assert!(!result.success);
        assert_eq!(result.message, PUBLISH_BUS_ERROR_MESSAGE);
        assert_eq!(
            result.failure,
            Some(PublishFailure::Bus(BusError::NotConnected))
        );
    }

    #[test]
    fn serializes_only_success_and_message() {
        let result = PublishResult::rejected(ValidationError::EmptyField("usuario"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "success": false,
                "message": "field `usuario` must not be empty",
            })
        );
    }
}
