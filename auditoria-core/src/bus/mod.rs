//! Event bus seam.
//!
//! Backends implement [`BusConnector`]; everything above it only sees
//! [`BusProducer`] for appends and [`BusSubscription`] for ordered reads with
//! explicit offset commits. The connection manager in [`crate::connection`]
//! is the only caller of a connector.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::error::BusError;

pub use memory::{MemoryBus, MemoryConnector};

/// A message as delivered by the bus, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn origin(&self) -> MessageOrigin {
        MessageOrigin {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Bus coordinates of a consumed message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageOrigin {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl fmt::Display for MessageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// Where an appended message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendAck {
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait BusConnector: Send + Sync + fmt::Debug {
    /// Human readable broker address, used in logs and errors.
    fn endpoint(&self) -> String;

    async fn connect_producer(&self) -> Result<Arc<dyn BusProducer>, BusError>;

    async fn subscribe(
        &self,
        topic: &str,
        from_earliest: bool,
    ) -> Result<Box<dyn BusSubscription>, BusError>;
}

/// Append side of a connection. Must tolerate concurrent callers.
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Resolves once the bus acknowledged the message as durably appended.
    async fn append(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<AppendAck, BusError>;
}

/// Ordered stream of messages for one consumer-group member.
#[async_trait]
pub trait BusSubscription: Send {
    /// Next message in delivery order. `None` means the stream was closed.
    async fn next_message(&mut self) -> Option<Result<RawMessage, BusError>>;

    /// Advances the group's committed position past `message`.
    async fn commit(&mut self, message: &RawMessage) -> Result<(), BusError>;
}
