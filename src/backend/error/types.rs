/**
 * Backend Error Types
 *
 * Errors raised by the collaboration backend. Only `Coordinator::init`
 * surfaces them to a caller; inside the running loops they are logged and
 * confined to the single message being processed.
 *
 * # Error Categories
 *
 * ## Fatal to init
 *
 * - Document not found
 * - Subscription failure
 * - Store failure while recovering the counter
 *
 * ## Degraded
 *
 * - Patch failure on a single update
 * - Post-processing service failures
 * - Save failures
 */

use thiserror::Error;

use crate::backend::patch::PatchError;
use crate::backend::services::ServiceError;
use crate::backend::trips::fractional::FractionalIndexError;
use crate::shared::{ConfigError, SharedError};

/// Backend-wide error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// The document store has no document with this ID
    #[error("Document not found: {id}")]
    DocumentNotFound {
        /// Requested document ID
        id: String,
    },

    /// Session/sequence store failure
    #[error("Store error: {message}")]
    StoreError {
        /// Human-readable error message
        message: String,
    },

    /// Message bus failure
    #[error("Bus error: {message}")]
    BusError {
        /// Human-readable error message
        message: String,
    },

    /// The coordinator has stopped and no longer accepts work
    #[error("Coordinator for {document_id} has stopped")]
    CoordinatorStopped {
        /// Document the coordinator was responsible for
        document_id: String,
    },

    /// Patch could not be applied to the snapshot
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Post-processing service failure
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Fractional index generation failure
    #[error(transparent)]
    FractionalIndex(#[from] FractionalIndexError),

    /// Database failure in the document store
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared error (codec, validation)
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration while wiring the process
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    /// Create a new bus error
    pub fn bus(message: impl Into<String>) -> Self {
        Self::BusError {
            message: message.into(),
        }
    }

    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::DocumentNotFound { id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DocumentNotFound { .. })
    }
}
