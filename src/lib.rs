//! Client-side abuse prevention and session security core
//!
//! This crate is the heuristic layer an application consults around
//! authentication-sensitive operations: a fixed-window rate limiter with
//! progressive banning, a role-aware session-validity tracker, a bounded
//! security-event log, and stateless input-risk sanitizers. It performs no
//! real authentication and enforces nothing server-side; it slows down
//! abusive retry patterns and provides session-expiry UX on a single device.
//!
//! All durable state goes through the [`store::KeyValueStore`] abstraction
//! with fail-open semantics: a corrupt or unavailable store behaves as "no
//! prior attempts, no ban, no logs, no session", so a storage outage degrades
//! protection instead of blocking the user. Policy outcomes (rate limited,
//! banned, session invalid) are plain return values, never errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::{RateLimiter, SecurityLogger, SessionManager, store::MemoryStore};
//!
//! let durable = Arc::new(MemoryStore::new());
//! let ephemeral = Arc::new(MemoryStore::new());
//!
//! let limiter = RateLimiter::new(durable.clone());
//! let audit = SecurityLogger::new(durable, "Mozilla/5.0 ...");
//! let sessions = SessionManager::new(ephemeral);
//!
//! let decision = limiter.check_rate_limit("login", "user@example.com").await;
//! if decision.allowed {
//!     // attempt the login, then:
//!     limiter.record_attempt("login", "user@example.com", false).await;
//!     audit.log("login_failed", serde_json::json!({"email": "user@example.com"})).await;
//! }
//! ```

pub mod audit;
pub mod error;
pub mod limiter;
pub mod sanitize;
pub mod session;
pub mod store;

pub use audit::{MAX_LOG_ENTRIES, SecurityLogEntry, SecurityLogger};
pub use error::Error;
pub use limiter::{
    AttemptRecord, BanRecord, BanStatus, LimitPolicy, RateLimitDecision, RateLimiter,
    SUSPICIOUS_ACTIVITY_THRESHOLD,
};
pub use sanitize::{
    PasswordCheck, detect_sql_injection, detect_xss, is_suspicious, sanitize_email, sanitize_text,
    validate_password,
};
pub use session::{SessionManager, SessionRecord};
pub use store::{FileStore, KeyValueStore, MemoryStore};
