use std::{fmt, time::Duration};

use thiserror::Error;

/// Which side of the bus a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRole {
    Producer,
    Consumer,
}

impl fmt::Display for BusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusRole::Producer => f.write_str("producer"),
            BusRole::Consumer => f.write_str("consumer"),
        }
    }
}

/// Failure reported by a bus backend for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("not connected to the event bus")]
    NotConnected,

    #[error("event bus connection lost: {0}")]
    Disconnected(String),

    #[error("failed to connect to the event bus at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("append to topic `{topic}` failed: {reason}")]
    Append { topic: String, reason: String },

    #[error("subscription to topic `{topic}` failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("offset commit failed: {0}")]
    Commit(String),
}

impl BusError {
    /// Whether the underlying connection should be considered gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, BusError::NotConnected | BusError::Disconnected(_))
    }
}

/// The connection retry policy gave up.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(
        "gave up connecting to the event bus as {role} after {attempts} attempts"
    )]
    Exhausted {
        role: BusRole,
        attempts: u32,
        #[source]
        last: BusError,
    },
}

/// One store write did not complete. Never retried past the write policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreWriteError {
    #[error("{store} store write timed out after {timeout:?}")]
    Timeout {
        store: &'static str,
        timeout: Duration,
    },

    #[error("{store} store write failed: {reason}")]
    Backend {
        store: &'static str,
        reason: String,
    },
}

impl StoreWriteError {
    pub fn backend(store: &'static str, reason: impl fmt::Display) -> Self {
        StoreWriteError::Backend {
            store,
            reason: reason.to_string(),
        }
    }
}

/// Failure while building a store client at startup.
#[derive(Debug, Error)]
pub enum StoreInitError {
    #[error("failed to connect to Redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to build object store operator: {0}")]
    ObjectStore(#[from] opendal::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),
}
