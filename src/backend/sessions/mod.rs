//! Session Store Module
//!
//! Tracks which members are connected to which document and holds the
//! per-document sequence counter. The store is shared by every process in the
//! fleet; each operation is atomic at the store level, and nothing in the
//! coordinator adds locking on top.
//!
//! # Counter Semantics
//!
//! The stored counter is the next sequence number a coordinator would assign.
//! An absent counter means "start from [`INITIAL_COUNTER`]". The counter carries
//! a TTL: a coordinator that stops refreshing it (because it crashed) lets it
//! expire, and a fresh coordinator then starts from the default again.

use async_trait::async_trait;

use crate::backend::error::SyncError;
use crate::shared::SessionContext;

/// In-memory implementation
pub mod memory;

pub use memory::MemorySessionStore;

/// Counter value used when no counter is stored for a document
pub const INITIAL_COUNTER: u64 = 1;

/// Membership and sequence counter storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a live connection; re-adding the same connection is a no-op
    async fn add_session_context(&self, session: &SessionContext) -> Result<(), SyncError>;

    /// Forget a connection; removing an unknown connection is a no-op
    async fn remove_session_context(&self, session: &SessionContext) -> Result<(), SyncError>;

    /// Live connections for a document, in the order they joined
    async fn list_session_contexts(&self, document_id: &str) -> Result<Vec<SessionContext>, SyncError>;

    /// Stored counter, or `None` if absent or expired
    async fn get_counter(&self, document_id: &str) -> Result<Option<u64>, SyncError>;

    /// Advance the counter and refresh its TTL; an absent counter starts from
    /// [`INITIAL_COUNTER`], an expired one continues from its last value.
    /// Returns the new value.
    async fn increment_counter(&self, document_id: &str) -> Result<u64, SyncError>;

    /// Delete the counter
    async fn delete_counter(&self, document_id: &str) -> Result<(), SyncError>;

    /// Extend the counter's TTL; no-op when the counter is absent
    async fn refresh_counter_ttl(&self, document_id: &str) -> Result<(), SyncError>;
}

/// Distinct member IDs of a document's sessions, in join order
pub fn member_ids(sessions: &[SessionContext]) -> Vec<String> {
    let mut members: Vec<String> = Vec::with_capacity(sessions.len());
    for session in sessions {
        if !members.contains(&session.member_id) {
            members.push(session.member_id.clone());
        }
    }
    members
}
