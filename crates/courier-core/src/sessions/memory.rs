//! In-memory session store

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::traits::{Session, SessionGuard, SessionResult, SessionStore, SessionSummary};
use crate::logging::Logger;
use crate::types::Turn;
use crate::{log_debug, log_info};

struct Entry {
    turns: VecDeque<Arc<Turn>>,
    last_active: Instant,
}

impl Entry {
    fn new() -> Self {
        Self {
            turns: VecDeque::new(),
            last_active: Instant::now(),
        }
    }
}

/// Keeps sessions in process memory; lost on restart
pub struct MemorySessionStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    logger: Arc<dyn Logger>,
}

impl MemorySessionStore {
    pub fn new(max_turns: usize, logger: Arc<dyn Logger>) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            logger,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn touch(&self, user_id: &str) {
        self.sessions
            .lock()
            .entry(user_id.to_string())
            .or_insert_with(Entry::new)
            .last_active = Instant::now();
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lock(&self, user_id: &str) -> SessionResult<SessionGuard> {
        let permit = self.user_lock(user_id).lock_owned().await;
        self.touch(user_id);
        Ok(SessionGuard::new(user_id, permit))
    }

    async fn get(&self, user_id: &str) -> SessionResult<Session> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(user_id.to_string()).or_insert_with(Entry::new);
        Ok(Session {
            user_id: user_id.to_string(),
            turns: entry.turns.iter().cloned().collect(),
        })
    }

    async fn append(&self, user_id: &str, turn: Turn) -> SessionResult<()> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(user_id.to_string()).or_insert_with(Entry::new);
        entry.turns.push_back(Arc::new(turn));
        while entry.turns.len() > self.max_turns {
            entry.turns.pop_front();
        }
        entry.last_active = Instant::now();
        log_debug!(
            self.logger,
            "[SessionStore] {} now holds {} turns",
            user_id,
            entry.turns.len()
        );
        Ok(())
    }

    async fn snapshot(&self, user_id: &str) -> SessionResult<Vec<Arc<Turn>>> {
        Ok(self
            .sessions
            .lock()
            .get(user_id)
            .map(|entry| entry.turns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list(&self) -> SessionResult<Vec<SessionSummary>> {
        let sessions = self.sessions.lock();
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .map(|(user_id, entry)| SessionSummary {
                user_id: user_id.clone(),
                turn_count: entry.turns.len(),
                last_reply: entry.turns.back().map(|t| t.reply.clone()),
            })
            .collect();
        summaries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(summaries)
    }

    async fn evict_idle(&self, max_idle: Duration) -> SessionResult<usize> {
        let now = Instant::now();
        let mut locks = self.locks.lock();
        let mut sessions = self.sessions.lock();

        let before = sessions.len();
        sessions.retain(|user_id, entry| {
            // A held lock means a turn is running for this user
            let busy = locks
                .get(user_id)
                .map(|lock| Arc::strong_count(lock) > 1)
                .unwrap_or(false);
            busy || now.duration_since(entry.last_active) <= max_idle
        });
        locks.retain(|user_id, lock| sessions.contains_key(user_id) || Arc::strong_count(lock) > 1);

        let evicted = before - sessions.len();
        if evicted > 0 {
            log_info!(self.logger, "[SessionStore] Evicted {} idle sessions", evicted);
        }
        Ok(evicted)
    }
}
