/**
 * In-Memory Session Store
 *
 * A `SessionStore` kept in process memory, used by tests and single-node
 * deployments. Counters expire on the tokio clock so TTL behaviour can be
 * exercised without a real key-value store.
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::backend::error::SyncError;
use crate::backend::sessions::{SessionStore, INITIAL_COUNTER};
use crate::shared::SessionContext;

#[derive(Debug, Clone, Copy)]
struct StoredCounter {
    value: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Vec<SessionContext>>,
    counters: HashMap<String, StoredCounter>,
}

/// Session store backed by process memory
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<Inner>>,
    counter_ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(counter_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            counter_ttl,
        }
    }

    /// Seed a counter directly, as a previous coordinator would have left it
    pub async fn set_counter(&self, document_id: &str, value: u64) {
        let mut inner = self.inner.write().await;
        inner.counters.insert(
            document_id.to_string(),
            StoredCounter {
                value,
                expires_at: Instant::now() + self.counter_ttl,
            },
        );
    }

    /// Remaining TTL of a live counter
    pub async fn counter_ttl_remaining(&self, document_id: &str) -> Option<Duration> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        inner
            .counters
            .get(document_id)
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.expires_at - now)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::shared::config::DEFAULT_COUNTER_TTL_MS))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn add_session_context(&self, session: &SessionContext) -> Result<(), SyncError> {
        let mut inner = self.inner.write().await;
        let sessions = inner.sessions.entry(session.document_id.clone()).or_default();
        match sessions
            .iter_mut()
            .find(|existing| existing.connection_id == session.connection_id)
        {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        tracing::debug!(
            "[Sessions] {} connected to {} via {}",
            session.member_id,
            session.document_id,
            session.connection_id
        );
        Ok(())
    }

    async fn remove_session_context(&self, session: &SessionContext) -> Result<(), SyncError> {
        let mut inner = self.inner.write().await;
        if let Some(sessions) = inner.sessions.get_mut(&session.document_id) {
            sessions.retain(|existing| existing.connection_id != session.connection_id);
            if sessions.is_empty() {
                inner.sessions.remove(&session.document_id);
            }
        }
        Ok(())
    }

    async fn list_session_contexts(&self, document_id: &str) -> Result<Vec<SessionContext>, SyncError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(document_id).cloned().unwrap_or_default())
    }

    async fn get_counter(&self, document_id: &str) -> Result<Option<u64>, SyncError> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        Ok(inner
            .counters
            .get(document_id)
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.value))
    }

    async fn increment_counter(&self, document_id: &str) -> Result<u64, SyncError> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let expires_at = now + self.counter_ttl;
        let counter = inner
            .counters
            .entry(document_id.to_string())
            .or_insert(StoredCounter {
                value: INITIAL_COUNTER,
                expires_at,
            });
        if counter.expires_at <= now {
            // A restart may already have read nothing here; never hand out a number twice.
            tracing::warn!(
                "[Sessions] {}: counter {} expired before increment, continuing from it",
                document_id,
                counter.value
            );
        }
        counter.value += 1;
        counter.expires_at = expires_at;
        Ok(counter.value)
    }

    async fn delete_counter(&self, document_id: &str) -> Result<(), SyncError> {
        self.inner.write().await.counters.remove(document_id);
        Ok(())
    }

    async fn refresh_counter_ttl(&self, document_id: &str) -> Result<(), SyncError> {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        if let Some(counter) = inner.counters.get_mut(document_id) {
            if counter.expires_at > now {
                counter.expires_at = now + self.counter_ttl;
            }
        }
        Ok(())
    }
}
