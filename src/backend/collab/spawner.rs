/**
 * Coordinator Spawner
 *
 * Watches every document's request subject (fan-out, so every spawner in the
 * fleet sees every join) and starts a coordinator when a join makes a
 * document's membership exactly one.
 *
 * # Duplicate Spawns
 *
 * Two spawners can both observe a membership of one in a narrow window and
 * both start a coordinator. The coordinators' queue-group subscription makes
 * the extra one inert: each request reaches only one of them. The local
 * `running` map only stops this process from spawning twice.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::collab::coordinator::{Coordinator, CoordinatorHandle};
use crate::backend::error::SyncError;
use crate::backend::realtime::{BusMessage, Subscription};
use crate::backend::server::state::SyncContext;
use crate::shared::{codec, SessionContext, Topic};

/// Locally started coordinators; `None` while one is still initializing
type Running = Arc<Mutex<HashMap<String, Option<CoordinatorHandle>>>>;

fn lock(running: &Running) -> MutexGuard<'_, HashMap<String, Option<CoordinatorHandle>>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Spawner {
    context: SyncContext,
}

impl Spawner {
    pub fn new(context: SyncContext) -> Self {
        Self { context }
    }

    /// Subscribe and start listening; joins published after this returns
    /// are seen
    pub async fn start(self) -> Result<SpawnerHandle, SyncError> {
        let pattern = self.context.subjects.all_requests();
        let subscription = self.context.bus.subscribe(&pattern).await?;
        let running: Running = Arc::default();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let listener = Listener {
            context: self.context,
            running: Arc::clone(&running),
        };
        let task = tokio::spawn(listener.run(subscription, shutdown_rx));

        tracing::info!("[Spawner] Listening on {}", pattern);
        Ok(SpawnerHandle {
            running,
            shutdown,
            task,
        })
    }
}

/// Control handle for a started spawner
pub struct SpawnerHandle {
    running: Running,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SpawnerHandle {
    /// Whether this process has a coordinator for the document (running or starting)
    pub fn is_running(&self, document_id: &str) -> bool {
        lock(&self.running).contains_key(document_id)
    }

    /// Handle of a local coordinator, once it has started
    pub fn coordinator(&self, document_id: &str) -> Option<CoordinatorHandle> {
        lock(&self.running).get(document_id).cloned().flatten()
    }

    /// Documents with a local coordinator, sorted
    pub fn running_documents(&self) -> Vec<String> {
        let mut documents: Vec<String> = lock(&self.running).keys().cloned().collect();
        documents.sort();
        documents
    }

    /// Stop watching for joins. Coordinators already started keep running
    /// until their last member leaves or they are stopped through their handle.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            tracing::error!("[Spawner] Listener task failed: {}", e);
        }
        tracing::info!("[Spawner] Stopped");
    }
}

struct Listener {
    context: SyncContext,
    running: Running,
}

impl Listener {
    async fn run(self, mut subscription: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            let request = tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                request = subscription.next_message() => request,
            };
            match request {
                Some(request) => self.on_request(request).await,
                None => {
                    tracing::warn!("[Spawner] Subscription closed");
                    break;
                }
            }
        }
        subscription.unsubscribe();
    }

    async fn on_request(&self, request: BusMessage) {
        let message = match codec::decode(&request.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("[Spawner] Ignoring undecodable request on {}: {}", request.subject, e);
                return;
            }
        };
        if message.topic() != Topic::Join {
            return;
        }

        let session = message.session_context();
        match self.should_spawn(&session).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!("[Spawner] {}: join handling failed: {}", session.document_id, e);
                return;
            }
        }

        tokio::spawn(spawn_coordinator(
            self.context.clone(),
            Arc::clone(&self.running),
            session,
        ));
    }

    /// Record the session; spawn only for the first member, and only if this
    /// process is not already running the document
    async fn should_spawn(&self, session: &SessionContext) -> Result<bool, SyncError> {
        let sessions = &self.context.sessions;
        sessions.add_session_context(session).await?;
        let members = sessions.list_session_contexts(&session.document_id).await?;
        if members.len() != 1 {
            tracing::debug!(
                "[Spawner] {}: {} members, coordinator assumed live",
                session.document_id,
                members.len()
            );
            return Ok(false);
        }

        if !claim(&self.running, &session.document_id) {
            tracing::debug!("[Spawner] {}: already running locally", session.document_id);
            return Ok(false);
        }
        Ok(true)
    }
}

/// Run coordinators for a document until it has no members left
///
/// Joins that arrive while a coordinator drains are recorded by the listener
/// but reach no ingest loop, so membership is re-read after every stop and a
/// replacement coordinator bootstraps whoever is still waiting.
async fn spawn_coordinator(context: SyncContext, running: Running, session: SessionContext) {
    let document_id = session.document_id.clone();
    let mut waiting = vec![session];

    loop {
        let Some(handle) = start_coordinator(&context, &running, &document_id, &waiting).await else {
            return;
        };
        for session in &waiting {
            if let Err(e) = handle.bootstrap(session).await {
                tracing::warn!("[Spawner] {}: bootstrap of {} failed: {}", document_id, session.member_id, e);
            }
        }

        handle.stopped().await;
        if handle.stop_requested() {
            lock(&running).remove(&document_id);
            tracing::info!("[Spawner] {}: coordinator stopped on request", document_id);
            return;
        }
        // Released before re-reading membership: a join recorded after this
        // point finds no local entry and spawns through the listener instead.
        lock(&running).remove(&document_id);

        waiting = match context.sessions.list_session_contexts(&document_id).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!("[Spawner] {}: membership check after stop failed: {}", document_id, e);
                Vec::new()
            }
        };
        if waiting.is_empty() || !claim(&running, &document_id) {
            tracing::info!("[Spawner] {}: coordinator released", document_id);
            return;
        }
        tracing::info!(
            "[Spawner] {}: {} member(s) joined while draining, restarting",
            document_id,
            waiting.len()
        );
    }
}

/// Init and run a coordinator for a claimed document. On failure the claim
/// is dropped and the waiting sessions are forgotten, so the next join is a
/// first join again.
async fn start_coordinator(
    context: &SyncContext,
    running: &Running,
    document_id: &str,
    waiting: &[SessionContext],
) -> Option<CoordinatorHandle> {
    match Coordinator::init(context.clone(), document_id).await {
        Ok(coordinator) => {
            let handle = coordinator.run();
            lock(running).insert(document_id.to_string(), Some(handle.clone()));
            tracing::info!("[Spawner] {}: coordinator started", document_id);
            Some(handle)
        }
        Err(e) => {
            tracing::error!("[Spawner] {}: coordinator failed to start: {}", document_id, e);
            for session in waiting {
                if let Err(e) = context.sessions.remove_session_context(session).await {
                    tracing::warn!(
                        "[Spawner] {}: could not forget {}: {}",
                        document_id,
                        session.connection_id,
                        e
                    );
                }
            }
            lock(running).remove(document_id);
            None
        }
    }
}

/// Mark the document as starting locally; `false` if it already is
fn claim(running: &Running, document_id: &str) -> bool {
    let mut running = lock(running);
    if running.contains_key(document_id) {
        return false;
    }
    running.insert(document_id.to_string(), None);
    true
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
