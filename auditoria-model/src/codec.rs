//! Envelope codec for audit events on the bus.
//!
//! The body is UTF-8 JSON: `{"usuario", "accion", "timestamp"}`. Decoding also
//! accepts the English field names `actor`, `action` and `occurredAt`; when a
//! payload carries both spellings of a field, the Spanish one wins. Only
//! structure is checked; field contents are passed through untouched.

use serde::Deserialize;

use crate::{
    error::DecodeError,
    event::{AuditEvent, rfc3339},
};

#[derive(Debug, Deserialize)]
struct WireEvent {
    usuario: Option<String>,
    actor: Option<String>,
    accion: Option<String>,
    action: Option<String>,
    timestamp: Option<String>,
    #[serde(rename = "occurredAt")]
    occurred_at: Option<String>,
}

/// Serializes an event for the bus. Never fails.
pub fn encode(event: &AuditEvent) -> Vec<u8> {
    serde_json::json!({
        "usuario": event.actor,
        "accion": event.action,
        "timestamp": rfc3339::format(&event.occurred_at),
    })
    .to_string()
    .into_bytes()
}

pub fn decode(raw: &[u8]) -> Result<AuditEvent, DecodeError> {
    let wire: WireEvent = serde_json::from_slice(raw)?;

    let actor = required(preferred(wire.usuario, wire.actor), "usuario")?;
    let action = required(preferred(wire.accion, wire.action), "accion")?;
    let timestamp =
        required(preferred(wire.timestamp, wire.occurred_at), "timestamp")?;
    let occurred_at = rfc3339::parse(&timestamp).map_err(|err| {
        DecodeError::Malformed(format!("invalid timestamp `{timestamp}`: {err}"))
    })?;

    Ok(AuditEvent {
        actor,
        action,
        occurred_at,
    })
}

/// First non-blank spelling of a field.
fn preferred(primary: Option<String>, alias: Option<String>) -> Option<String> {
    primary
        .filter(|value| !value.trim().is_empty())
        .or(alias)
}

fn required(
    value: Option<String>,
    field: &'static str,
) -> Result<String, DecodeError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DecodeError::MissingField(field)),
    }
}
