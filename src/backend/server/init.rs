/**
 * Server Initialization
 *
 * Builds the `SyncContext` from configuration.
 *
 * # Service Selection
 *
 * - `database_url` set: SQLite document store, otherwise in-memory
 * - `routing_url` / `media_url` set: HTTP clients, otherwise `DisabledService`
 *
 * The bus and session store are in-process. A fleet deployment swaps in
 * shared implementations of `MessageBus` and `SessionStore` through
 * [`SyncContext::new`].
 */

use std::sync::Arc;

use crate::backend::documents::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use crate::backend::error::SyncError;
use crate::backend::realtime::LocalBus;
use crate::backend::server::state::SyncContext;
use crate::backend::services::{
    DisabledService, HttpMediaSigner, HttpRoutingService, MediaSigner, RoutingService,
};
use crate::backend::sessions::MemorySessionStore;
use crate::backend::trips::TripHooks;
use crate::shared::SyncConfig;

/// Build the context for a single-process deployment
pub async fn create_context(config: SyncConfig) -> Result<SyncContext, SyncError> {
    config.validate()?;
    tracing::info!("Initializing tripsync backend (prefix '{}')", config.subject_prefix);

    let documents: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => Arc::new(SqliteDocumentStore::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set. Documents are kept in memory.");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let routing: Arc<dyn RoutingService> = match &config.routing_url {
        Some(url) => Arc::new(HttpRoutingService::new(url.clone())?),
        None => {
            tracing::warn!("Routing service not configured. Routes will not be computed.");
            Arc::new(DisabledService)
        }
    };

    let signer: Arc<dyn MediaSigner> = match &config.media_url {
        Some(url) => Arc::new(HttpMediaSigner::new(url.clone())?),
        None => {
            tracing::warn!("Media service not configured. Media URLs will not be signed.");
            Arc::new(DisabledService)
        }
    };

    let hooks = Arc::new(TripHooks::new(routing, signer, &config));
    let sessions = Arc::new(MemorySessionStore::new(config.counter_ttl()));

    Ok(SyncContext::new(Arc::new(LocalBus::new()), sessions, documents, config).with_hooks(hooks))
}
