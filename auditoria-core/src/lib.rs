//! # Auditoria Core
//!
//! The audit event pipeline shared by the gateway and the worker.
//!
//! ## Overview
//!
//! - **Connection management**: [`connection::BusConnectionManager`] owns the
//!   bus connection and applies a [`connection::RetryPolicy`] to every
//!   connect, including background producer reconnection
//! - **Publishing**: [`publisher::Publisher`] validates an action, stamps it
//!   and appends it to the audit topic, reporting a structured result
//! - **Consuming**: [`consumer::ConsumerLoop`] reads one message at a time,
//!   persists it and commits the offset only afterwards
//! - **Persistence**: [`persistence::PersistenceCoordinator`] writes every
//!   event to a fast store and a durable store independently
//!
//! ## Feature Flags
//!
//! - `kafka`: Enables the librdkafka-backed bus in [`bus::kafka`]
//!
//! Without `kafka` the only bus backend is the in-process
//! [`bus::MemoryBus`], which is what the tests and the standalone mode use.

pub mod bus;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod persistence;
pub mod publisher;
pub mod store;

pub use connection::{BusConnectionManager, RetryPolicy};
pub use consumer::{
    ConsumerLoop, ConsumerState, ConsumerStats, ConsumerStatsSnapshot,
    MessageOutcome,
};
pub use error::{
    BusError, BusRole, ConnectionError, StoreInitError, StoreWriteError,
};
pub use persistence::{
    LogIdStrategy, PersistResult, PersistenceCoordinator, WritePolicy,
};
pub use publisher::{PublishFailure, PublishResult, Publisher};
