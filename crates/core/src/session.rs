//! Per-user conversation sessions.
//!
//! [`SessionStore`] owns one history per user identifier. A turn checks the history out with
//! [`SessionStore::checkout`], which holds that user's async mutex until the returned guard
//! is dropped: turns for the same user run one at a time and in arrival order, turns for
//! different users run in parallel.
//!
//! The store is bounded. Sessions idle for at least the TTL are dropped on the next access,
//! and when the number of sessions exceeds the capacity the least recently used idle session
//! is dropped. A session that is checked out (or waited on) is never dropped.

use crate::llm::ChatTurn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive access to one user's history for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<Vec<ChatTurn>>;

type SharedHistory = Arc<AsyncMutex<Vec<ChatTurn>>>;

struct Entry {
    history: SharedHistory,
    last_used: Instant,
}

impl Entry {
    /// Only the map itself holds the history.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.history) == 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub ttl: Duration,
    pub capacity: usize,
}

pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Waits for exclusive access to `user_id`'s history, creating an empty one on first
    /// contact or after expiry.
    pub async fn checkout(&self, user_id: &str) -> SessionGuard {
        let history = self.acquire(user_id);
        history.lock_owned().await
    }

    /// Copy of `user_id`'s history, or an empty list when there is no live session.
    pub async fn snapshot(&self, user_id: &str) -> Vec<ChatTurn> {
        let history = {
            let entries = self.lock_entries();
            entries.get(user_id).map(|entry| Arc::clone(&entry.history))
        };
        match history {
            Some(history) => history.lock().await.clone(),
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock_entries().len()
    }

    fn acquire(&self, user_id: &str) -> SharedHistory {
        let now = Instant::now();
        let mut entries = self.lock_entries();

        let ttl = self.limits.ttl;
        let before = entries.len();
        entries.retain(|_, entry| !(entry.is_idle() && now.duration_since(entry.last_used) >= ttl));
        let expired = before - entries.len();
        if expired > 0 {
            tracing::debug!(expired, "dropped idle sessions");
        }

        let entry = entries.entry(user_id.to_owned()).or_insert_with(|| Entry {
            history: Arc::new(AsyncMutex::new(Vec::new())),
            last_used: now,
        });
        entry.last_used = now;
        let history = Arc::clone(&entry.history);

        while entries.len() > self.limits.capacity {
            let oldest = entries
                .iter()
                .filter(|(_, entry)| entry.is_idle())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            let Some(key) = oldest else {
                tracing::warn!(
                    sessions = entries.len(),
                    capacity = self.limits.capacity,
                    "session capacity exceeded with every session in use"
                );
                break;
            };
            entries.remove(&key);
            tracing::debug!("evicted least recently used session");
        }

        history
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
