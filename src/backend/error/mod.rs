//! Backend Error Module
//!
//! Defines the error type used throughout the collaboration backend.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs    - Module exports and documentation
//! └── types.rs  - Error type definitions and constructors
//! ```
//!
//! # Propagation
//!
//! `SyncError` is returned from store, bus and service calls. The coordinator
//! loops never propagate it; they log and continue with the next message.

/// Error type definitions
pub mod types;

// Re-export commonly used types
pub use types::SyncError;
