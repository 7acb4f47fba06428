//! Document Store Module
//!
//! Read/save of whole document snapshots by ID. The coordinator treats a
//! snapshot as opaque JSON bytes; the store copy is only as fresh as the last
//! successful save.
//!
//! # Module Structure
//!
//! ```text
//! documents/
//! ├── mod.rs     - DocumentStore trait
//! ├── memory.rs  - In-memory store for tests and development
//! └── sqlite.rs  - sqlx-backed SQLite store
//! ```

use async_trait::async_trait;

use crate::backend::error::SyncError;

/// In-memory document store
pub mod memory;

/// SQLite document store
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Persistence of document snapshots
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a snapshot; `SyncError::DocumentNotFound` if it does not exist
    async fn read(&self, document_id: &str) -> Result<Vec<u8>, SyncError>;

    /// Persist a snapshot, replacing any previous one
    async fn save(&self, document_id: &str, snapshot: &[u8]) -> Result<(), SyncError>;
}
