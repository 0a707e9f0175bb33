//! In-memory store backend
//!
//! Backs the ephemeral session scope and is the store of choice in tests.
//! Contents vanish when the store is dropped, which is exactly the lifecycle
//! of a session-scoped record.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::Error;

use super::KeyValueStore;

/// Volatile key/value store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }
}
