//! Key/value persistence abstraction
//!
//! All state in this crate lives in a [`KeyValueStore`]: attempt counters,
//! bans, and the audit log in a durable scope, and the active session record
//! in a shorter-lived scope. Scopes are expressed by constructing separate
//! store instances; the services do not care which backend they are given.
//!
//! Records are read and written as whole JSON blobs. Concurrent writers to a
//! shared backend race with last-write-wins semantics on the whole blob;
//! callers needing stronger guarantees must serialize writes per key through
//! a single owner.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;

/// Abstract key/value persistence for JSON-serializable blobs.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Fetch the blob stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, Error>;

    /// Store `value` under `key`, replacing any previous blob.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), Error>;

    /// Delete the blob stored under `key`. Deleting an absent key is a no-op.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Load and deserialize a record, treating every failure as the default value.
///
/// This is the fail-open contract: a missing, corrupt, or unreadable record
/// behaves as "no prior state". Failures are logged and never propagated.
pub(crate) async fn load_json<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    match store.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt record");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Store read failed, treating as empty");
            T::default()
        }
    }
}

/// Serialize and persist a record, dropping the update on any failure.
pub(crate) async fn store_json<T, S>(store: &S, key: &str, value: &T)
where
    T: Serialize,
    S: KeyValueStore + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(blob) => {
            if let Err(e) = store.set(key, blob).await {
                tracing::warn!(key, error = %e, "Store write failed, dropping update");
            }
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "Serialization failed, dropping update");
        }
    }
}
