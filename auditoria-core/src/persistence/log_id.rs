use std::{fmt, str::FromStr, sync::Arc};

use auditoria_model::LogId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::MessageOrigin;

const LOG_ID_PREFIX: &str = "kafka-log";

/// Derives the identifier for a consumed event.
pub trait LogIdGenerator: Send + Sync + fmt::Debug {
    fn generate(&self, origin: Option<&MessageOrigin>) -> LogId;
}

/// `kafka-log-<uuid v7>`. Collision resistant and time ordered.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidLogIds;

impl LogIdGenerator for UuidLogIds {
    fn generate(&self, _origin: Option<&MessageOrigin>) -> LogId {
        LogId::new(format!("{LOG_ID_PREFIX}-{}", Uuid::now_v7()))
    }
}

/// `kafka-log-<topic>-<partition>-<offset>`.
///
/// Stable across redeliveries of the same message, so a redelivered event
/// overwrites its earlier copies. Falls back to a UUID without bus
/// coordinates.
#[derive(Debug, Default, Clone, Copy)]
pub struct OffsetLogIds;

impl LogIdGenerator for OffsetLogIds {
    fn generate(&self, origin: Option<&MessageOrigin>) -> LogId {
        match origin {
            Some(origin) => LogId::new(format!(
                "{LOG_ID_PREFIX}-{}-{}-{}",
                origin.topic, origin.partition, origin.offset
            )),
            None => UuidLogIds.generate(None),
        }
    }
}

/// `kafka-log-<unix millis>`.
///
/// Two events consumed within the same millisecond get the same id and the
/// later write replaces the earlier one in both stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampLogIds;

impl LogIdGenerator for TimestampLogIds {
    fn generate(&self, _origin: Option<&MessageOrigin>) -> LogId {
        LogId::new(format!("{LOG_ID_PREFIX}-{}", Utc::now().timestamp_millis()))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogIdStrategy {
    #[default]
    Uuid,
    Offset,
    Timestamp,
}

impl LogIdStrategy {
    pub fn generator(self) -> Arc<dyn LogIdGenerator> {
        match self {
            LogIdStrategy::Uuid => Arc::new(UuidLogIds),
            LogIdStrategy::Offset => Arc::new(OffsetLogIds),
            LogIdStrategy::Timestamp => Arc::new(TimestampLogIds),
        }
    }
}

impl FromStr for LogIdStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(LogIdStrategy::Uuid),
            "offset" => Ok(LogIdStrategy::Offset),
            "timestamp" => Ok(LogIdStrategy::Timestamp),
            other => Err(format!(
                "unknown log id strategy `{other}` (expected uuid, offset or timestamp)"
            )),
        }
    }
}
