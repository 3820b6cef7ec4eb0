use async_trait::async_trait;
use dashmap::DashMap;

use super::FastStore;
use crate::error::StoreWriteError;

/// Process-local fast store for tests and standalone runs.
#[derive(Debug, Default)]
pub struct MemoryFastStore {
    entries: DashMap<String, String>,
}

impl MemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[async_trait]
impl FastStore for MemoryFastStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreWriteError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
