//! The two-legged notifier used by every context.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::broadcast::{BroadcastHub, BroadcastPoster};
use crate::event::{NotificationEvent, Topic};
use crate::notifier::{Handler, Notifier, Subscription};
use crate::page::PageChannel;

/// Channel name shared by every context of the application.
pub const BROADCAST_CHANNEL_NAME: &str = "brandgen-events";

/// Publishes each event on the local [`PageChannel`] and on the shared
/// broadcast channel, and re-dispatches messages posted by other contexts to
/// local subscribers.
///
/// A local subscriber may therefore see one logical change twice (once from
/// its own context, once relayed from another that reacted to it); handlers
/// are expected to be idempotent.
pub struct CrossContextNotifier {
    page: Arc<PageChannel>,
    poster: BroadcastPoster,
    forwarder: JoinHandle<()>,
}

impl CrossContextNotifier {
    /// Open a handle on [`BROADCAST_CHANNEL_NAME`] and start forwarding.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(hub: &BroadcastHub, origin: impl Into<String>) -> Self {
        Self::with_channel_name(hub, BROADCAST_CHANNEL_NAME, origin)
    }

    pub fn with_channel_name(hub: &BroadcastHub, name: &str, origin: impl Into<String>) -> Self {
        let page = Arc::new(PageChannel::new(origin));
        let mut channel = hub.open(name);
        let poster = channel.poster();

        let local = Arc::clone(&page);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = channel.recv().await {
                tracing::trace!(
                    topic = %event.topic(),
                    from = event.origin.as_deref().unwrap_or("-"),
                    "Relaying cross-context event"
                );
                local.dispatch(&event);
            }
            tracing::debug!(origin = local.origin(), "Cross-context forwarder stopped");
        });

        Self {
            page,
            poster,
            forwarder,
        }
    }

    pub fn origin(&self) -> &str {
        self.page.origin()
    }

    pub fn is_closed(&self) -> bool {
        self.poster.is_closed()
    }

    /// Close the broadcast handle and stop forwarding. Local subscribers
    /// keep working; nothing is exchanged with other contexts afterwards.
    pub fn close(&self) {
        self.poster.close();
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.page.subscriber_count(topic)
    }
}

impl Notifier for CrossContextNotifier {
    fn publish(&self, event: NotificationEvent) {
        let event = self.page.stamp(event);
        if let Err(e) = self.poster.post(event.clone()) {
            tracing::debug!(error = %e, topic = %event.topic(), "Cross-context leg skipped");
        }
        self.page.dispatch(&event);
    }

    fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        self.page.subscribe(topic, handler)
    }
}

impl Drop for CrossContextNotifier {
    fn drop(&mut self) {
        self.close();
        self.forwarder.abort();
    }
}
