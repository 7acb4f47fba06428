use async_trait::async_trait;
use serde_json::Value;

use crate::backend::error::SyncError;
use crate::shared::{SyncOp, UpdatePayload};

/// Result of post-processing one update
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessed {
    /// Snapshot after the derived ops
    pub snapshot: Vec<u8>,
    /// Derived ops, appended to the broadcast update
    pub ops: Vec<SyncOp>,
}

impl PostProcessed {
    pub fn unchanged(snapshot: &[u8]) -> Self {
        Self {
            snapshot: snapshot.to_vec(),
            ops: Vec::new(),
        }
    }
}

/// Document-type specific behaviour plugged into the coordinator
///
/// The coordinator itself only knows snapshots as JSON bytes; everything that
/// understands the document's shape lives behind this trait.
#[async_trait]
pub trait DocumentHooks: Send + Sync {
    /// Snapshot sent to a joining member, with derived fields filled in.
    /// The result is never persisted.
    async fn augment_snapshot(&self, document_id: &str, snapshot: &[u8]) -> Result<Value, SyncError>;

    /// Run the update's post-processor over the freshly patched snapshot
    async fn post_process(
        &self,
        document_id: &str,
        update: &UpdatePayload,
        snapshot: &[u8],
    ) -> Result<PostProcessed, SyncError>;
}

/// Hooks for documents with no derived state
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl DocumentHooks for NoopHooks {
    async fn augment_snapshot(&self, _document_id: &str, snapshot: &[u8]) -> Result<Value, SyncError> {
        Ok(serde_json::from_slice(snapshot)?)
    }

    async fn post_process(
        &self,
        _document_id: &str,
        _update: &UpdatePayload,
        snapshot: &[u8],
    ) -> Result<PostProcessed, SyncError> {
        Ok(PostProcessed::unchanged(snapshot))
    }
}
