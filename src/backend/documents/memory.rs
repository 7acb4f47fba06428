use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::documents::DocumentStore;
use crate::backend::error::SyncError;

/// Document store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    saves: Arc<RwLock<HashMap<String, usize>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document from a JSON value
    pub async fn insert(&self, document_id: &str, document: &Value) -> Result<(), SyncError> {
        let bytes = serde_json::to_vec(document)?;
        self.documents.write().await.insert(document_id.to_string(), bytes);
        Ok(())
    }

    /// Current stored document decoded as JSON
    pub async fn get_json(&self, document_id: &str) -> Option<Value> {
        let documents = self.documents.read().await;
        documents
            .get(document_id)
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }

    /// Number of `save` calls seen for a document
    pub async fn save_count(&self, document_id: &str) -> usize {
        self.saves.read().await.get(document_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, document_id: &str) -> Result<Vec<u8>, SyncError> {
        self.documents
            .read()
            .await
            .get(document_id)
            .cloned()
            .ok_or_else(|| SyncError::document_not_found(document_id))
    }

    async fn save(&self, document_id: &str, snapshot: &[u8]) -> Result<(), SyncError> {
        self.documents
            .write()
            .await
            .insert(document_id.to_string(), snapshot.to_vec());
        *self.saves.write().await.entry(document_id.to_string()).or_insert(0) += 1;
        Ok(())
    }
}
