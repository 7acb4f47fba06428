//! Backend Module
//!
//! Server side of the trip collaboration system: per-document sequencing,
//! the stores and bus it runs on, and the trip-specific post-processing.
//!
//! # Architecture
//!
//! - **`collab`** - Coordinator (per-document total order) and Spawner
//! - **`realtime`** - Message bus trait, in-process bus, subject naming
//! - **`sessions`** - Membership and sequence counter storage
//! - **`documents`** - Document snapshot storage (memory, SQLite)
//! - **`patch`** - JSON Pointer patch engine
//! - **`trips`** - Trip model, fractional indexing, post-processors
//! - **`services`** - Routing and media signing clients
//! - **`server`** - `SyncContext` and its construction from config
//! - **`error`** - Backend error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs       - Module exports and documentation
//! ├── main.rs      - tripsync-server binary
//! ├── collab/      - Coordinator, Spawner, DocumentHooks
//! ├── realtime/    - MessageBus, LocalBus, Subjects
//! ├── sessions/    - SessionStore, MemorySessionStore
//! ├── documents/   - DocumentStore, memory and SQLite stores
//! ├── patch.rs     - Patch engine
//! ├── trips/       - Trip document and post-processing
//! ├── services/    - External service clients
//! ├── server/      - Context wiring
//! └── error/       - Error types
//! ```
//!
//! # Ordering
//!
//! All requests for one document go through one coordinator, which stamps a
//! gap-free counter, applies, persists and broadcasts in counter order. The
//! stores and the bus are atomic per operation; nothing above them takes a
//! distributed lock.

/// Context wiring
pub mod server;

/// Coordinator and spawner
pub mod collab;

/// Message bus
pub mod realtime;

/// Session store
pub mod sessions;

/// Document store
pub mod documents;

/// Patch engine
pub mod patch;

/// Trip documents
pub mod trips;

/// External services
pub mod services;

/// Backend error types
pub mod error;

pub use collab::{Coordinator, CoordinatorHandle, Spawner, SpawnerHandle};
pub use error::SyncError;
pub use server::{create_context, SyncContext};
