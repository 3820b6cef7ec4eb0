use std::fmt;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{debug, info};

use super::FastStore;
use crate::error::{StoreInitError, StoreWriteError};

/// Fast store backed by Redis.
#[derive(Clone)]
pub struct RedisFastStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisFastStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisFastStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisFastStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreInitError> {
        info!("Connecting to Redis fast store");

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Successfully connected to Redis fast store");
        Ok(Self { conn })
    }

    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreWriteError> {
        debug!("Redis SET: {}", key);
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| StoreWriteError::backend("fast", e))
    }
}
