//! Server Module
//!
//! Process-wide wiring for the collaboration backend.
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── state.rs  - SyncContext (bus, stores, hooks, config)
//! └── init.rs   - Context creation from SyncConfig
//! ```
//!
//! # Initialization Flow
//!
//! 1. **Configuration**: `SyncConfig` from the environment or a TOML file
//! 2. **Stores**: SQLite document store when `database_url` is set
//! 3. **Services**: HTTP routing/media clients when their URLs are set
//! 4. **Hooks**: `TripHooks` over those services
//! 5. **Spawner**: started by the caller with the finished context

/// Shared context
pub mod state;

/// Context initialization
pub mod init;

pub use init::create_context;
pub use state::SyncContext;
