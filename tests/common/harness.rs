//! In-process harness: one bus, memory stores, a context and helpers to
//! talk to coordinators the way clients do

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use tripsync::backend::collab::DocumentHooks;
use tripsync::backend::documents::MemoryDocumentStore;
use tripsync::backend::realtime::{publish_message, LocalBus, MessageBus, Subscription};
use tripsync::backend::server::SyncContext;
use tripsync::backend::sessions::{MemorySessionStore, SessionStore};
use tripsync::shared::{codec, SyncConfig, SyncMessage};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub bus: Arc<LocalBus>,
    pub sessions: Arc<MemorySessionStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            bus: Arc::new(LocalBus::new()),
            sessions: Arc::new(MemorySessionStore::new(config.counter_ttl())),
            documents: Arc::new(MemoryDocumentStore::new()),
            config,
        }
    }

    pub fn context(&self) -> SyncContext {
        SyncContext::new(
            self.bus.clone(),
            self.sessions.clone(),
            self.documents.clone(),
            self.config.clone(),
        )
    }

    pub fn context_with_hooks(&self, hooks: Arc<dyn DocumentHooks>) -> SyncContext {
        self.context().with_hooks(hooks)
    }

    /// Context sharing this harness's bus and documents but another session store
    pub fn context_with_sessions(&self, sessions: Arc<dyn SessionStore>) -> SyncContext {
        SyncContext::new(
            self.bus.clone(),
            sessions,
            self.documents.clone(),
            self.config.clone(),
        )
    }

    pub async fn seed(&self, document_id: &str, document: Value) {
        self.documents.insert(document_id, &document).await.unwrap();
    }

    /// Subscribe to a document's responses the way a client does
    pub async fn responses(&self, document_id: &str) -> Subscription {
        self.bus
            .subscribe(&format!("{}.{}.responses", self.config.subject_prefix, document_id))
            .await
            .unwrap()
    }

    /// Publish a request on the document's request subject
    pub async fn send(&self, message: &SyncMessage) {
        let subject = format!("{}.{}.requests", self.config.subject_prefix, message.document_id);
        publish_message(self.bus.as_ref(), &subject, message).await.unwrap();
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Next decoded response, failing the test after `RECV_TIMEOUT`
pub async fn next_response(subscription: &mut Subscription) -> SyncMessage {
    let message = timeout(RECV_TIMEOUT, subscription.next_message())
        .await
        .expect("timed out waiting for a response")
        .expect("subscription closed");
    codec::decode(&message.payload).unwrap()
}

/// Assert nothing arrives within `wait`
pub async fn assert_no_response(subscription: &mut Subscription, wait: Duration) {
    if let Ok(Some(message)) = timeout(wait, subscription.next_message()).await {
        panic!("unexpected response: {:?}", codec::decode(&message.payload));
    }
}

/// Poll `condition` until it holds, failing after `RECV_TIMEOUT`
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within {:?}", RECV_TIMEOUT);
}
