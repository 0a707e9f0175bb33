//! Bounded security event log
//!
//! An append-only, newest-first audit trail of named security events, capped
//! at a fixed number of entries. The cap keeps the persisted blob small;
//! the oldest entries are evicted on overflow. Entries carry the user-agent
//! string the logger was constructed with.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, load_json, store_json};

pub(crate) const LOGS_KEY: &str = "security_logs";

/// Maximum number of retained log entries.
pub const MAX_LOG_ENTRIES: usize = 100;

/// One recorded security event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub details: serde_json::Value,
    pub user_agent: String,
}

/// Size-bounded audit trail of named security events.
pub struct SecurityLogger<S: KeyValueStore> {
    store: Arc<S>,
    user_agent: String,
}

impl<S: KeyValueStore> SecurityLogger<S> {
    pub fn new(store: Arc<S>, user_agent: impl Into<String>) -> Self {
        Self {
            store,
            user_agent: user_agent.into(),
        }
    }

    /// Record a named event, evicting the oldest entry past the cap.
    pub async fn log(&self, event: &str, details: serde_json::Value) {
        let mut logs: Vec<SecurityLogEntry> = load_json(&*self.store, LOGS_KEY).await;
        logs.insert(
            0,
            SecurityLogEntry {
                timestamp: Utc::now(),
                event: event.to_string(),
                details,
                user_agent: self.user_agent.clone(),
            },
        );
        logs.truncate(MAX_LOG_ENTRIES);
        store_json(&*self.store, LOGS_KEY, &logs).await;
        tracing::debug!(event, "Security event recorded");
    }

    /// All retained entries, newest first. Empty on any read failure.
    pub async fn get_logs(&self) -> Vec<SecurityLogEntry> {
        load_json(&*self.store, LOGS_KEY).await
    }

    /// Drop entries older than `days_to_keep` days.
    pub async fn clear_old_logs(&self, days_to_keep: i64) {
        let cutoff = Utc::now() - Duration::days(days_to_keep);
        let mut logs: Vec<SecurityLogEntry> = load_json(&*self.store, LOGS_KEY).await;
        let before = logs.len();
        logs.retain(|entry| entry.timestamp >= cutoff);
        if logs.len() != before {
            tracing::debug!(removed = before - logs.len(), "Pruned old security log entries");
            store_json(&*self.store, LOGS_KEY, &logs).await;
        }
    }
}
