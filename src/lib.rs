//! Tripsync - Main Library
//!
//! Real-time collaboration backend for shared trip documents. Many clients
//! edit the same trip concurrently; a per-document coordinator applies every
//! edit in one global order and broadcasts the result to all participants,
//! across a horizontally scaled fleet.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared with transport adapters and clients
//!   - Sync message envelope, operations, byte codec
//!   - Configuration
//!   - Error types
//!
//! - **`backend`** - Server-side code
//!   - Coordinator and Spawner
//!   - Message bus, session and document stores
//!   - Patch engine and trip post-processing
//!
//! # Usage
//!
//! ```rust,no_run
//! use tripsync::backend::{create_context, Spawner};
//! use tripsync::shared::SyncConfig;
//!
//! # async fn example() -> Result<(), tripsync::backend::SyncError> {
//! let context = create_context(SyncConfig::from_env()?).await?;
//! let spawner = Spawner::new(context).start().await?;
//! # spawner.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! - `shared::SharedError` for codec and validation failures
//! - `backend::SyncError` for everything server-side
//! - Only coordinator initialization returns errors to a caller; the running
//!   loops log and degrade per message

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
