//! Collaboration Module
//!
//! Per-document sequencing and its lifecycle management:
//!
//! - **`coordinator`** - Total-order sequencer for one document (ingest,
//!   apply and liveness tasks)
//! - **`spawner`** - Starts a coordinator when a document gets its first member
//! - **`hooks`** - Seam for document-type specific snapshot augmentation and
//!   post-processing
//!
//! # Example
//!
//! ```rust,no_run
//! use tripsync::backend::collab::Spawner;
//! use tripsync::backend::server::create_context;
//! use tripsync::shared::SyncConfig;
//!
//! # async fn example() -> Result<(), tripsync::backend::error::SyncError> {
//! let context = create_context(SyncConfig::default()).await?;
//! let spawner = Spawner::new(context).start().await?;
//! // ...
//! spawner.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Per-document sequencer
pub mod coordinator;

/// First-join coordinator spawning
pub mod spawner;

/// Document hooks
pub mod hooks;

pub use coordinator::{Coordinator, CoordinatorHandle, CoordinatorState};
pub use hooks::{DocumentHooks, NoopHooks, PostProcessed};
pub use spawner::{Spawner, SpawnerHandle};
