/**
 * Bus Subscriptions
 *
 * A `Subscription` is the stream half of a bus subscription plus the signal
 * that tears it down. Dropping it unsubscribes; `unsubscribe` does the same
 * explicitly. Bus implementations supply the teardown closure so the type is
 * shared by every transport.
 */

use bytes::Bytes;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// One message delivered by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Concrete subject the message was published on
    pub subject: String,
    /// Encoded payload
    pub payload: Bytes,
}

type Teardown = Box<dyn FnOnce() + Send + Sync>;

/// Live subscription to a subject pattern
pub struct Subscription {
    pattern: String,
    messages: UnboundedReceiverStream<BusMessage>,
    teardown: Option<Teardown>,
}

impl Subscription {
    pub fn new(
        pattern: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<BusMessage>,
        teardown: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            messages: UnboundedReceiverStream::new(receiver),
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Pattern this subscription was registered with
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the next message; `None` once the bus side has gone away
    pub async fn next_message(&mut self) -> Option<BusMessage> {
        self.messages.next().await
    }

    /// Stop receiving; already-buffered messages are discarded
    pub fn unsubscribe(mut self) {
        self.teardown_now();
    }

    fn teardown_now(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            tracing::debug!("[Bus] Unsubscribing from {}", self.pattern);
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown_now();
    }
}

impl Stream for Subscription {
    type Item = BusMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().messages).poll_next(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .field("active", &self.teardown.is_some())
            .finish()
    }
}
