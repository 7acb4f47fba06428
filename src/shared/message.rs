/**
 * Sync Message Types
 *
 * The envelope exchanged between clients and coordinators over the bus.
 * Requests travel without a counter; the coordinator stamps each one with
 * the next sequence number before it is broadcast, and that counter is the
 * only ordering marker clients may rely on.
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::shared::error::SharedError;

/// Message topic, derived from the payload variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Join,
    Leave,
    Update,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::Join => "join",
            Topic::Leave => "leave",
            Topic::Update => "update",
        };
        f.write_str(name)
    }
}

/// Identity of one live client connection on one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub connection_id: String,
    pub document_id: String,
    pub member_id: String,
}

impl SessionContext {
    pub fn new(
        connection_id: impl Into<String>,
        document_id: impl Into<String>,
        member_id: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            document_id: document_id.into(),
            member_id: member_id.into(),
        }
    }

    /// Context for a brand new connection; the connection id is a fresh UUID.
    pub fn connect(document_id: impl Into<String>, member_id: impl Into<String>) -> Self {
        Self::new(format!("conn-{}", Uuid::new_v4()), document_id, member_id)
    }
}

/// JSON-Patch style operation verb
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
}

/// A single mutation addressed by a JSON Pointer into the document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncOp {
    pub op: OpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl SyncOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Add,
            path: path.into(),
            value,
            from: None,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Remove,
            path: path.into(),
            value: Value::Null,
            from: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Replace,
            path: path.into(),
            value,
            from: None,
        }
    }

    pub fn move_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Move,
            path: path.into(),
            value: Value::Null,
            from: Some(from.into()),
        }
    }

    pub fn copy_from(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Copy,
            path: path.into(),
            value: Value::Null,
            from: Some(from.into()),
        }
    }
}

/// Closed set of update kinds that select a post-processor.
///
/// Unknown kinds sent by newer clients decode as `Generic` and receive no
/// post-processing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    AddMedia,
    UpdateLodging,
    UpdateItinerary,
    OptimizeRoute,
    UpdateDateRange,
    #[default]
    #[serde(other)]
    Generic,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::AddMedia,
        OperationKind::UpdateLodging,
        OperationKind::UpdateItinerary,
        OperationKind::OptimizeRoute,
        OperationKind::UpdateDateRange,
        OperationKind::Generic,
    ];
}

/// Join payload: empty on the request path, snapshot and members on the response path
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Update payload: an atomic, ordered list of operations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default)]
    pub operation_kind: OperationKind,
    pub ops: Vec<SyncOp>,
}

/// Topic-tagged payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "topic", content = "data", rename_all = "camelCase")]
pub enum SyncPayload {
    Join(JoinPayload),
    Leave,
    Update(UpdatePayload),
}

/// Envelope carried on both the request and the response channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub connection_id: String,
    pub document_id: String,
    pub member_id: String,
    /// Total-order marker, assigned by the coordinator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<u64>,
    pub payload: SyncPayload,
    /// Set when the coordinator could not apply an update; the counter is still consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncMessage {
    pub fn new(session: &SessionContext, payload: SyncPayload) -> Self {
        Self {
            connection_id: session.connection_id.clone(),
            document_id: session.document_id.clone(),
            member_id: session.member_id.clone(),
            counter: None,
            payload,
            error: None,
        }
    }

    pub fn join(session: &SessionContext) -> Self {
        Self::new(session, SyncPayload::Join(JoinPayload::default()))
    }

    pub fn leave(session: &SessionContext) -> Self {
        Self::new(session, SyncPayload::Leave)
    }

    pub fn update(session: &SessionContext, operation_kind: OperationKind, ops: Vec<SyncOp>) -> Self {
        Self::new(session, SyncPayload::Update(UpdatePayload { operation_kind, ops }))
    }

    pub fn topic(&self) -> Topic {
        match self.payload {
            SyncPayload::Join(_) => Topic::Join,
            SyncPayload::Leave => Topic::Leave,
            SyncPayload::Update(_) => Topic::Update,
        }
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(
            self.connection_id.clone(),
            self.document_id.clone(),
            self.member_id.clone(),
        )
    }

    /// Reject envelopes missing any of the identity fields
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.connection_id.is_empty() {
            return Err(SharedError::validation("connectionId", "must not be empty"));
        }
        if self.document_id.is_empty() {
            return Err(SharedError::validation("documentId", "must not be empty"));
        }
        if self.member_id.is_empty() {
            return Err(SharedError::validation("memberId", "must not be empty"));
        }
        Ok(())
    }
}
