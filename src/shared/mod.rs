//! Shared Module
//!
//! Types shared between the collaboration backend and the transport adapters
//! that speak to it: the sync message envelope, its byte codec, the shared
//! error type, and configuration.

/// Sync message envelope and operations
pub mod message;

/// Byte encoding of messages on the bus
pub mod codec;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::SharedError;
pub use message::{
    JoinPayload, OpKind, OperationKind, SessionContext, SyncMessage, SyncOp, SyncPayload, Topic,
    UpdatePayload,
};
