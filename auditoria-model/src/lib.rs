//! Data model shared by the audit gateway and the audit worker.
//!
//! The wire shape of an [`AuditEvent`] is owned by [`codec`]; everything that
//! crosses the bus goes through [`codec::encode`] and [`codec::decode`].

pub mod codec;
pub mod error;
pub mod event;

pub use codec::{decode, encode};
pub use error::{DecodeError, ValidationError};
pub use event::{ActionRequest, AuditEvent, LogId, PersistedLogRecord};

/// Topic the gateway publishes to and the worker subscribes to.
pub const DEFAULT_TOPIC: &str = "logs-auditoria";
