//! Session store contract

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Turn;

/// Session store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The backing store failed
    #[error("session backend error: {0}")]
    Backend(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One user's conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    /// Oldest first, at most the configured cap
    pub turns: Vec<Arc<Turn>>,
}

/// Listing entry for the conversations endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_id: String,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reply: Option<String>,
}

/// Exclusive right to run a turn for one user.
///
/// Held for the whole turn; dropping it lets the next turn for that user in.
pub struct SessionGuard {
    user_id: String,
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn new(user_id: impl Into<String>, permit: tokio::sync::OwnedMutexGuard<()>) -> Self {
        Self {
            user_id: user_id.into(),
            _permit: permit,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Per-user conversation history.
///
/// Implementations serialize turns per user through `lock` and allow
/// distinct users to proceed in parallel.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Wait for exclusive access to a user's session
    async fn lock(&self, user_id: &str) -> SessionResult<SessionGuard>;

    /// Session for the user, created empty if absent
    async fn get(&self, user_id: &str) -> SessionResult<Session>;

    /// Append a finished turn, dropping the oldest past the cap
    async fn append(&self, user_id: &str, turn: Turn) -> SessionResult<()>;

    /// Retained turns, oldest first
    async fn snapshot(&self, user_id: &str) -> SessionResult<Vec<Arc<Turn>>>;

    /// Summaries of every stored session
    async fn list(&self) -> SessionResult<Vec<SessionSummary>>;

    /// Drop sessions untouched for longer than `max_idle`; returns how many
    async fn evict_idle(&self, max_idle: Duration) -> SessionResult<usize>;
}
