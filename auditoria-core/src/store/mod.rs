//! Store seams for the two copies of every consumed event.

pub mod memory;
pub mod object;
pub mod redis;

use async_trait::async_trait;

use crate::error::StoreWriteError;

pub use memory::MemoryFastStore;
pub use object::ObjectDurableStore;
pub use self::redis::RedisFastStore;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Low-latency key-value copy. Not the source of truth.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// `SET key value`, no expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreWriteError>;
}

/// Long-term object copy.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<(), StoreWriteError>;
}
