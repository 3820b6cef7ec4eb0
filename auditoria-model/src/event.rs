use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Caller-supplied description of an action. Lives only for one publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "usuario", alias = "actor")]
    pub actor: String,
    #[serde(rename = "accion", alias = "action")]
    pub action: String,
}

impl ActionRequest {
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.actor.trim().is_empty() {
            return Err(ValidationError::EmptyField("usuario"));
        }
        if self.action.trim().is_empty() {
            return Err(ValidationError::EmptyField("accion"));
        }
        Ok(())
    }

    /// Validates the request and stamps it with `occurred_at`.
    pub fn into_event(
        self,
        occurred_at: DateTime<Utc>,
    ) -> Result<AuditEvent, ValidationError> {
        self.validate()?;
        Ok(AuditEvent {
            actor: self.actor,
            action: self.action,
            occurred_at,
        })
    }
}

/// The canonical audit event carried on the bus and stored by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "usuario", alias = "actor")]
    pub actor: String,
    #[serde(rename = "accion", alias = "action")]
    pub action: String,
    #[serde(rename = "timestamp", alias = "occurredAt", with = "rfc3339")]
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            occurred_at,
        }
    }

    /// Current time at millisecond precision, matching what producers emit.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Identifier assigned to an event when the worker consumes it.
///
/// Uniqueness depends on the generator that produced it; readers of the
/// stores must tolerate collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(String);

impl LogId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object key for the durable copy, `<prefix>/<id>.json`.
    pub fn object_key(&self, prefix: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}.json", self.0)
        } else {
            format!("{prefix}/{}.json", self.0)
        }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LogId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What both stores hold: the event flattened next to its `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLogRecord {
    #[serde(rename = "id")]
    pub log_id: LogId,
    #[serde(flatten)]
    pub payload: AuditEvent,
}

impl PersistedLogRecord {
    pub fn new(log_id: LogId, payload: AuditEvent) -> Self {
        Self { log_id, payload }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "id": self.log_id.as_str(),
            "usuario": self.payload.actor,
            "accion": self.payload.action,
            "timestamp": rfc3339::format(&self.payload.occurred_at),
        })
        .to_string()
    }
}

pub(crate) mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }
}
