/**
 * Trip Document Hooks
 *
 * Connects the trip post-processors to the coordinator. Processors work on a
 * decoded `Trip`; the derived ops they return are then applied to the JSON
 * snapshot itself, so the stored document is exactly what a client gets by
 * replaying the broadcast ops. Fields the `Trip` model does not know about
 * are never touched.
 */

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::collab::hooks::{DocumentHooks, PostProcessed};
use crate::backend::error::SyncError;
use crate::backend::patch::{self, pointer};
use crate::backend::services::{MediaSigner, RoutingService};
use crate::backend::trips::model::Trip;
use crate::backend::trips::processors::{processor_for, PostProcessor};
use crate::shared::{OperationKind, SyncConfig, SyncOp, UpdatePayload};

pub struct TripHooks {
    processors: HashMap<OperationKind, Arc<dyn PostProcessor>>,
    signer: Arc<dyn MediaSigner>,
}

impl TripHooks {
    pub fn new(
        routing: Arc<dyn RoutingService>,
        signer: Arc<dyn MediaSigner>,
        config: &SyncConfig,
    ) -> Self {
        let processors = OperationKind::ALL
            .into_iter()
            .map(|kind| {
                let processor =
                    processor_for(kind, Arc::clone(&routing), Arc::clone(&signer), config.max_trip_days);
                (kind, processor)
            })
            .collect();
        Self { processors, signer }
    }
}

#[async_trait]
impl DocumentHooks for TripHooks {
    async fn augment_snapshot(&self, document_id: &str, snapshot: &[u8]) -> Result<Value, SyncError> {
        let mut document: Value = serde_json::from_slice(snapshot)?;
        let trip: Trip = serde_json::from_value(document.clone())?;

        let signed = join_all(trip.media.iter().map(|(id, item)| async move {
            (id, self.signer.sign(&item.key).await)
        }))
        .await;

        let mut ops = Vec::with_capacity(signed.len());
        for (id, result) in signed {
            match result {
                Ok(url) => ops.push(SyncOp::add(pointer(&["media", id.as_str(), "signedUrl"]), json!(url))),
                Err(e) => tracing::warn!("[Trips] {}: failed to sign media {}: {}", document_id, id, e),
            }
        }

        patch::apply_to_value(&mut document, &ops)?;
        Ok(document)
    }

    async fn post_process(
        &self,
        document_id: &str,
        update: &UpdatePayload,
        snapshot: &[u8],
    ) -> Result<PostProcessed, SyncError> {
        if update.operation_kind == OperationKind::Generic {
            return Ok(PostProcessed::unchanged(snapshot));
        }
        let Some(processor) = self.processors.get(&update.operation_kind) else {
            return Ok(PostProcessed::unchanged(snapshot));
        };

        let mut document: Value = serde_json::from_slice(snapshot)?;
        let mut trip: Trip = serde_json::from_value(document.clone())?;
        let ops = processor.process(&mut trip, &update.ops).await?;
        if ops.is_empty() {
            return Ok(PostProcessed::unchanged(snapshot));
        }

        patch::apply_to_value(&mut document, &ops)?;
        tracing::debug!(
            "[Trips] {}: {:?} derived {} ops",
            document_id,
            update.operation_kind,
            ops.len()
        );
        Ok(PostProcessed {
            snapshot: serde_json::to_vec(&document)?,
            ops,
        })
    }
}
