//! Shared Error Types
//!
//! Errors raised while building, encoding or decoding sync messages. These are
//! the only failures that can happen before a message reaches a coordinator, so
//! both the transport adapters and the backend see the same type.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON encoding/decoding of the wire envelope failed
//! - `ValidationError` - a field of a message is structurally invalid
//! - `MessageError` - the message is valid but was routed to the wrong document
//!
//! # Usage
//!
//! ```rust
//! use tripsync::shared::error::SharedError;
//!
//! let error = SharedError::validation("documentId", "must not be empty");
//! assert!(error.to_string().contains("documentId"));
//! ```
use thiserror::Error;

/// Errors shared by the wire layer and the backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Well-formed message delivered where it does not belong
    #[error("Misrouted message: {message}")]
    MessageError {
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new misrouted-message error
    pub fn message(message: impl Into<String>) -> Self {
        Self::MessageError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
