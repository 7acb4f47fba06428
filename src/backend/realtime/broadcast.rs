/**
 * Message Bus
 *
 * The publish/subscribe transport coordinators and spawners talk over.
 *
 * # Delivery Modes
 *
 * - **Fan-out** (`subscribe`): every matching subscriber receives a copy.
 * - **Queue group** (`queue_subscribe`): among the matching subscribers that
 *   share a group name, exactly one receives each message. Groups are chosen
 *   round-robin, so two coordinators racing for the same document split the
 *   request stream instead of both applying it.
 *
 * Fan-out and queue-group subscribers on the same subject are independent:
 * a message is delivered to every fan-out subscriber and to one member of
 * each group.
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;

use crate::backend::error::SyncError;
use crate::backend::realtime::subjects::{subject_matches, validate_pattern, validate_subject};
use crate::backend::realtime::subscription::{BusMessage, Subscription};
use crate::shared::{codec, SyncMessage};

/// Publish/subscribe transport shared by every process in the fleet
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload on a concrete subject
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), SyncError>;

    /// Fan-out subscription to a subject pattern
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, SyncError>;

    /// Competing-consumer subscription within a named group
    async fn queue_subscribe(&self, pattern: &str, group: &str) -> Result<Subscription, SyncError>;
}

/// Encode and publish a sync message
pub async fn publish_message(
    bus: &dyn MessageBus,
    subject: &str,
    message: &SyncMessage,
) -> Result<(), SyncError> {
    let payload = codec::encode(message)?;
    bus.publish(subject, payload).await
}

struct Subscriber {
    pattern: String,
    group: Option<String>,
    sender: mpsc::UnboundedSender<BusMessage>,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: BTreeMap<u64, Subscriber>,
    cursors: HashMap<String, usize>,
}

/// In-process bus with the same delivery semantics as the fleet transport
///
/// Cloning shares the underlying subscriber table, so every clone is the
/// same bus.
#[derive(Clone, Default)]
pub struct LocalBus {
    state: Arc<Mutex<BusState>>,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.subscribers.retain(|_, s| !s.sender.is_closed());
        state.subscribers.len()
    }

    fn register(&self, pattern: &str, group: Option<&str>) -> Result<Subscription, SyncError> {
        validate_pattern(pattern)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(
                id,
                Subscriber {
                    pattern: pattern.to_string(),
                    group: group.map(str::to_string),
                    sender,
                },
            );
            id
        };

        let weak: Weak<Mutex<BusState>> = Arc::downgrade(&self.state);
        Ok(Subscription::new(pattern, receiver, move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).subscribers.remove(&id);
            }
        }))
    }

    /// Deliver to matching subscribers; returns how many received the message
    fn deliver(&self, subject: &str, payload: Bytes) -> usize {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.subscribers.retain(|_, s| !s.sender.is_closed());

        let message = BusMessage {
            subject: subject.to_string(),
            payload,
        };
        let mut delivered = 0;
        let mut groups: BTreeMap<&str, Vec<u64>> = BTreeMap::new();

        for (id, subscriber) in &state.subscribers {
            if !subject_matches(&subscriber.pattern, subject) {
                continue;
            }
            match &subscriber.group {
                None => {
                    if subscriber.sender.send(message.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Some(group) => groups.entry(group.as_str()).or_default().push(*id),
            }
        }

        for (group, members) in groups {
            let cursor = state.cursors.entry(group.to_string()).or_insert(0);
            let chosen = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);
            if let Some(subscriber) = state.subscribers.get(&chosen) {
                if subscriber.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        delivered
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), SyncError> {
        validate_subject(subject)?;
        let delivered = self.deliver(subject, payload);
        tracing::debug!("[Bus] Published on {} to {} subscribers", subject, delivered);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, SyncError> {
        tracing::debug!("[Bus] Fan-out subscription on {}", pattern);
        self.register(pattern, None)
    }

    async fn queue_subscribe(&self, pattern: &str, group: &str) -> Result<Subscription, SyncError> {
        if group.is_empty() {
            return Err(SyncError::bus("queue group name must not be empty"));
        }
        tracing::debug!("[Bus] Queue subscription on {} in group {}", pattern, group);
        self.register(pattern, Some(group))
    }
}
