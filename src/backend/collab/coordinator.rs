/**
 * Document Coordinator
 *
 * Total-order sequencer for one document. Every request for the document
 * passes through exactly one coordinator (queue-group subscription), gets a
 * gap-free counter, is applied to the in-memory snapshot, persisted, and
 * broadcast on the document's response subject in counter order.
 *
 * # Tasks
 *
 * ```text
 *  requests ──► ingest ──(bounded FIFO)──► apply ──► responses
 *                 │ stamps counters          │ patch, post-process,
 *                 │ updates membership       │ save, increment counter,
 *                 │                          │ attach join snapshots
 *  liveness ── refreshes the stored counter's TTL on a fixed period
 * ```
 *
 * Only the ingest task assigns counters and only the apply task touches the
 * snapshot, so neither needs a lock. A join's snapshot is therefore read in
 * the apply task, not at ingest: it reflects every update ordered before
 * the join and none after it.
 *
 * # Lifecycle
 *
 * `Initializing → Running → Draining → Stopped`. Draining starts when the
 * last member leaves, when [`CoordinatorHandle::stop`] is called, or when the
 * bus closes the subscription. Already-stamped messages are still applied
 * and broadcast before the counter is deleted.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::backend::error::SyncError;
use crate::backend::patch;
use crate::backend::realtime::{publish_message, BusMessage, Subjects, Subscription};
use crate::backend::server::state::SyncContext;
use crate::backend::sessions::{member_ids, SessionStore, INITIAL_COUNTER};
use crate::shared::{codec, JoinPayload, SessionContext, SyncMessage, SyncPayload, Topic, UpdatePayload};

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// Entry of the ingest to apply queue
#[derive(Debug)]
enum Delivery {
    /// Counter-stamped request
    Ordered(SyncMessage),
    /// First-member join, published without a counter
    Bootstrap(SyncMessage),
}

/// A coordinator that finished `init` but has not started its tasks
pub struct Coordinator {
    document_id: String,
    context: SyncContext,
    snapshot: Vec<u8>,
    subscription: Subscription,
    next_counter: u64,
}

impl Coordinator {
    /// Load the document, join the coordinators' queue group and recover the
    /// counter. On failure nothing stays subscribed.
    pub async fn init(context: SyncContext, document_id: impl Into<String>) -> Result<Self, SyncError> {
        let document_id = document_id.into();
        Subjects::validate_document_id(&document_id)?;

        let snapshot = context.documents.read(&document_id).await?;

        let subject = context.subjects.requests(&document_id);
        let subscription = context
            .bus
            .queue_subscribe(&subject, &context.config.queue_group)
            .await?;

        // A store failure must not silently reset ordering to the default.
        let next_counter = context
            .sessions
            .get_counter(&document_id)
            .await?
            .unwrap_or(INITIAL_COUNTER);

        tracing::info!(
            "[Coordinator] {}: initialized at counter {} ({} byte snapshot)",
            document_id,
            next_counter,
            snapshot.len()
        );

        Ok(Self {
            document_id,
            context,
            snapshot,
            subscription,
            next_counter,
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Counter the next ordered message will receive
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    /// Start the ingest, apply and liveness tasks
    pub fn run(self) -> CoordinatorHandle {
        let Coordinator {
            document_id,
            context,
            snapshot,
            subscription,
            next_counter,
        } = self;

        let (state, state_rx) = watch::channel(CoordinatorState::Initializing);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let (deliveries, queue) = mpsc::channel(context.config.delivery_queue_capacity);

        let handle = CoordinatorHandle {
            document_id: document_id.clone(),
            shutdown: Arc::clone(&shutdown),
            stop_requested: Arc::new(AtomicBool::new(false)),
            state: state_rx,
            deliveries: deliveries.downgrade(),
            sessions: Arc::clone(&context.sessions),
        };

        let applier = Applier {
            responses: context.subjects.responses(&document_id),
            document_id: document_id.clone(),
            context: context.clone(),
            snapshot,
        };
        let apply = tokio::spawn(applier.run(queue));

        let liveness = tokio::spawn(liveness(
            Arc::clone(&context.sessions),
            document_id.clone(),
            context.config.liveness_interval(),
            shutdown_rx.clone(),
        ));

        let ingest = Ingest {
            document_id: document_id.clone(),
            sessions: Arc::clone(&context.sessions),
            subscription,
            next_counter,
            deliveries,
            shutdown: shutdown_rx,
        };

        state.send_replace(CoordinatorState::Running);
        tracing::info!("[Coordinator] {}: running", document_id);

        tokio::spawn(async move {
            ingest.run().await;

            state.send_replace(CoordinatorState::Draining);
            tracing::info!("[Coordinator] {}: draining", document_id);
            if let Err(e) = apply.await {
                tracing::error!("[Coordinator] {}: apply task failed: {}", document_id, e);
            }

            if let Err(e) = context.sessions.delete_counter(&document_id).await {
                tracing::warn!("[Coordinator] {}: failed to delete counter: {}", document_id, e);
            }
            shutdown.send_replace(true);
            if let Err(e) = liveness.await {
                tracing::error!("[Coordinator] {}: liveness task failed: {}", document_id, e);
            }

            state.send_replace(CoordinatorState::Stopped);
            tracing::info!("[Coordinator] {}: stopped", document_id);
        });

        handle
    }
}

/// Control handle for a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    document_id: String,
    shutdown: Arc<watch::Sender<bool>>,
    /// Set by `stop`; a coordinator ending on its own leaves it clear
    stop_requested: Arc<AtomicBool>,
    state: watch::Receiver<CoordinatorState>,
    deliveries: mpsc::WeakSender<Delivery>,
    sessions: Arc<dyn SessionStore>,
}

impl CoordinatorHandle {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == CoordinatorState::Stopped
    }

    /// Begin shutdown; calling it again has no further effect
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown came from [`stop`](Self::stop) rather than the last
    /// member leaving or the subscription closing
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Wait until the coordinator has fully stopped
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An error means the lifecycle task is gone, which only happens after Stopped.
        let _ = state.wait_for(|state| *state == CoordinatorState::Stopped).await;
    }

    /// Publish the document and member list to a first member, without
    /// waiting for a request to order it against
    pub async fn bootstrap(&self, session: &SessionContext) -> Result<(), SyncError> {
        let sessions = self.sessions.list_session_contexts(&self.document_id).await?;
        let message = SyncMessage::new(
            session,
            SyncPayload::Join(JoinPayload {
                snapshot: None,
                members: member_ids(&sessions),
            }),
        );

        let stopped = || SyncError::CoordinatorStopped {
            document_id: self.document_id.clone(),
        };
        let deliveries = self.deliveries.upgrade().ok_or_else(stopped)?;
        deliveries
            .send(Delivery::Bootstrap(message))
            .await
            .map_err(|_| stopped())
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("document_id", &self.document_id)
            .field("state", &self.state())
            .finish()
    }
}

enum Flow {
    Continue,
    Shutdown,
}

/// Sequencing side: owns the subscription and the counter
struct Ingest {
    document_id: String,
    sessions: Arc<dyn SessionStore>,
    subscription: Subscription,
    next_counter: u64,
    deliveries: mpsc::Sender<Delivery>,
    shutdown: watch::Receiver<bool>,
}

impl Ingest {
    /// Consume requests until shutdown; dropping `self` afterwards
    /// unsubscribes and closes the apply queue.
    async fn run(mut self) {
        loop {
            let request = tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => break,
                request = self.subscription.next_message() => request,
            };
            let Some(request) = request else {
                tracing::warn!("[Coordinator] {}: request subscription closed", self.document_id);
                break;
            };
            if let Flow::Shutdown = self.handle(request).await {
                break;
            }
        }
        self.subscription.unsubscribe();
    }

    async fn handle(&mut self, request: BusMessage) -> Flow {
        let mut message = match codec::decode_for(&request.payload, &self.document_id) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("[Coordinator] {}: dropping request: {}", self.document_id, e);
                return Flow::Continue;
            }
        };

        let session = message.session_context();
        match message.topic() {
            Topic::Join => match self.join(&session).await {
                Ok(members) => {
                    message.payload = SyncPayload::Join(JoinPayload { snapshot: None, members });
                }
                Err(e) => {
                    tracing::warn!("[Coordinator] {}: join of {} failed: {}", self.document_id, session.member_id, e);
                    return Flow::Continue;
                }
            },
            Topic::Leave => match self.leave(&session).await {
                Ok(true) => {
                    tracing::info!("[Coordinator] {}: last member left", self.document_id);
                    return Flow::Shutdown;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("[Coordinator] {}: leave of {} failed: {}", self.document_id, session.member_id, e);
                    return Flow::Continue;
                }
            },
            Topic::Update => {}
        }

        // The total-order point.
        message.counter = Some(self.next_counter);
        self.next_counter += 1;

        if self.deliveries.send(Delivery::Ordered(message)).await.is_err() {
            tracing::error!("[Coordinator] {}: apply queue closed", self.document_id);
            return Flow::Shutdown;
        }
        Flow::Continue
    }

    async fn join(&self, session: &SessionContext) -> Result<Vec<String>, SyncError> {
        self.sessions.add_session_context(session).await?;
        let sessions = self.sessions.list_session_contexts(&self.document_id).await?;
        Ok(member_ids(&sessions))
    }

    /// `true` when no members remain
    async fn leave(&self, session: &SessionContext) -> Result<bool, SyncError> {
        self.sessions.remove_session_context(session).await?;
        let sessions = self.sessions.list_session_contexts(&self.document_id).await?;
        Ok(sessions.is_empty())
    }
}

/// Apply side: owns the snapshot and publishes responses
struct Applier {
    document_id: String,
    context: SyncContext,
    snapshot: Vec<u8>,
    responses: String,
}

impl Applier {
    async fn run(mut self, mut queue: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = queue.recv().await {
            let (mut message, ordered) = match delivery {
                Delivery::Ordered(message) => (message, true),
                Delivery::Bootstrap(message) => (message, false),
            };

            match &mut message.payload {
                SyncPayload::Update(update) => {
                    if let Err(e) = self.apply_update(update).await {
                        tracing::warn!(
                            "[Coordinator] {}: update {:?} not applied: {}",
                            self.document_id,
                            message.counter,
                            e
                        );
                        message.error = Some(e.to_string());
                    }
                }
                SyncPayload::Join(join) => join.snapshot = self.join_snapshot().await,
                SyncPayload::Leave => {}
            }

            if ordered {
                if let Err(e) = self.context.sessions.increment_counter(&self.document_id).await {
                    tracing::warn!("[Coordinator] {}: counter increment failed: {}", self.document_id, e);
                }
            }

            if let Err(e) = publish_message(self.context.bus.as_ref(), &self.responses, &message).await {
                tracing::error!("[Coordinator] {}: broadcast failed: {}", self.document_id, e);
            }
        }
        tracing::debug!("[Coordinator] {}: apply queue drained", self.document_id);
    }

    /// Patch, post-process and save. A patch error leaves the snapshot as it
    /// was; post-processing and save errors only degrade.
    async fn apply_update(&mut self, update: &mut UpdatePayload) -> Result<(), SyncError> {
        let patched = patch::apply(&self.snapshot, &update.ops)?;

        self.snapshot = match self
            .context
            .hooks
            .post_process(&self.document_id, update, &patched)
            .await
        {
            Ok(processed) => {
                update.ops.extend(processed.ops);
                processed.snapshot
            }
            Err(e) => {
                tracing::warn!(
                    "[Coordinator] {}: {:?} post-processing failed: {}",
                    self.document_id,
                    update.operation_kind,
                    e
                );
                patched
            }
        };

        if let Err(e) = self.context.documents.save(&self.document_id, &self.snapshot).await {
            tracing::error!("[Coordinator] {}: save failed: {}", self.document_id, e);
        }
        Ok(())
    }

    async fn join_snapshot(&self) -> Option<serde_json::Value> {
        match self.context.hooks.augment_snapshot(&self.document_id, &self.snapshot).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!("[Coordinator] {}: snapshot augmentation failed: {}", self.document_id, e);
                serde_json::from_slice(&self.snapshot).ok()
            }
        }
    }
}

/// Resolves once shutdown was signalled or its sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn liveness(
    sessions: Arc<dyn SessionStore>,
    document_id: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            _ = ticker.tick() => {
                match sessions.refresh_counter_ttl(&document_id).await {
                    Ok(()) => tracing::debug!("[Coordinator] {}: counter TTL refreshed", document_id),
                    Err(e) => tracing::warn!("[Coordinator] {}: counter TTL refresh failed: {}", document_id, e),
                }
            }
        }
    }
}
