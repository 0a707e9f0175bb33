//! Session validity tracking
//!
//! A single session record lives in an ephemeral store scope and is checked
//! on demand; nothing polls in the background. Validity requires both the
//! absolute expiry and the role-specific idle allowance to hold. The idle
//! timeout is deliberately independent of, and for admins much shorter than,
//! the absolute timeout: an idle admin session dies after 30 minutes even
//! though its absolute expiry is two hours out.
//!
//! This is expiry UX, not authentication. Credential checks belong to the
//! identity provider; this module only decides when the local record stops
//! being trusted.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, load_json, store_json};

pub(crate) const SESSION_KEY: &str = "secure_session";

const ADMIN_ABSOLUTE_TIMEOUT_HOURS: i64 = 2;
const USER_ABSOLUTE_TIMEOUT_HOURS: i64 = 24;
const ADMIN_IDLE_TIMEOUT_MINUTES: i64 = 30;
const USER_IDLE_TIMEOUT_HOURS: i64 = 2;

/// The active session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
    pub is_admin: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the absolute timeout has elapsed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// The idle allowance for this session's role.
    pub fn idle_timeout(&self) -> Duration {
        if self.is_admin {
            Duration::minutes(ADMIN_IDLE_TIMEOUT_MINUTES)
        } else {
            Duration::hours(USER_IDLE_TIMEOUT_HOURS)
        }
    }

    fn is_idle_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_activity >= self.idle_timeout()
    }
}

fn absolute_timeout(is_admin: bool) -> Duration {
    if is_admin {
        Duration::hours(ADMIN_ABSOLUTE_TIMEOUT_HOURS)
    } else {
        Duration::hours(USER_ABSOLUTE_TIMEOUT_HOURS)
    }
}

/// Creates, refreshes, and invalidates the single active session record.
pub struct SessionManager<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> SessionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a new session after successful authentication.
    pub async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        is_admin: bool,
    ) -> SessionRecord {
        let now = Utc::now();
        let session = SessionRecord {
            user_id: user_id.to_string(),
            email: email.to_string(),
            is_admin,
            created_at: now,
            expires_at: now + absolute_timeout(is_admin),
            last_activity: now,
        };
        store_json(&*self.store, SESSION_KEY, &session).await;
        tracing::debug!(user_id, is_admin, "Session created");
        session
    }

    /// The current session record, if one is persisted. Does not validate.
    pub async fn current_session(&self) -> Option<SessionRecord> {
        load_json(&*self.store, SESSION_KEY).await
    }

    /// Mark user interaction, resetting the idle clock. No-op without a
    /// session.
    pub async fn update_activity(&self) {
        if let Some(mut session) = self.current_session().await {
            session.last_activity = Utc::now();
            store_json(&*self.store, SESSION_KEY, &session).await;
        }
    }

    /// Whether the persisted session is still valid right now.
    ///
    /// Any validity failure clears the record, so a later call cannot
    /// resurrect a session that has once expired.
    pub async fn is_session_valid(&self) -> bool {
        let Some(session) = self.current_session().await else {
            return false;
        };

        let now = Utc::now();
        if session.is_expired() {
            tracing::debug!(user_id = %session.user_id, "Session reached absolute timeout");
            self.clear_session().await;
            return false;
        }
        if session.is_idle_expired(now) {
            tracing::debug!(user_id = %session.user_id, "Session reached idle timeout");
            self.clear_session().await;
            return false;
        }
        true
    }

    /// Delete the persisted session record.
    pub async fn clear_session(&self) {
        if let Err(e) = self.store.remove(SESSION_KEY).await {
            tracing::warn!(error = %e, "Failed to clear session record");
        }
    }
}
