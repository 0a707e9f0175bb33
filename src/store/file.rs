//! File-backed store backend
//!
//! Persists all keys of one scope as a single JSON object file, rewritten
//! whole on every mutation. This mirrors the durable browser-storage scope
//! the services were designed around: small blobs, infrequent writes, and
//! no partial updates.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Error, error::StorageError};

use super::KeyValueStore;

/// Durable key/value store backed by a single JSON file.
///
/// Writes within one process are serialized through an internal lock. Writes
/// from multiple processes sharing the same file are last-write-wins, the
/// same accepted limitation as any shared-storage backend for this crate.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store over `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<HashMap<String, serde_json::Value>, Error> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()).into()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StorageError::Io(e.to_string()).into()),
        }
    }

    async fn write_entries(&self, entries: &HashMap<String, serde_json::Value>) -> Result<(), Error> {
        let bytes =
            serde_json::to_vec(entries).map_err(|e| StorageError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()).into())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value);
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}
