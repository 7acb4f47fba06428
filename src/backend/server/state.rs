/**
 * Sync Context
 *
 * Process-wide handles every coordinator and the spawner share: the bus,
 * both stores, the document hooks, and configuration. Cloning is cheap; all
 * collaborators sit behind `Arc`.
 *
 * # Thread Safety
 *
 * Every collaborator is `Send + Sync` and atomic at its own level; the
 * context adds no locking on top.
 */

use std::fmt;
use std::sync::Arc;

use crate::backend::collab::hooks::{DocumentHooks, NoopHooks};
use crate::backend::documents::DocumentStore;
use crate::backend::realtime::{MessageBus, Subjects};
use crate::backend::sessions::SessionStore;
use crate::shared::SyncConfig;

#[derive(Clone)]
pub struct SyncContext {
    pub bus: Arc<dyn MessageBus>,
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub hooks: Arc<dyn DocumentHooks>,
    pub config: SyncConfig,
    pub subjects: Subjects,
}

impl SyncContext {
    /// Context with no document hooks; see [`SyncContext::with_hooks`]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        sessions: Arc<dyn SessionStore>,
        documents: Arc<dyn DocumentStore>,
        config: SyncConfig,
    ) -> Self {
        let subjects = Subjects::new(config.subject_prefix.clone());
        Self {
            bus,
            sessions,
            documents,
            hooks: Arc::new(NoopHooks),
            config,
            subjects,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn DocumentHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("subjects", &self.subjects)
            .finish_non_exhaustive()
    }
}
