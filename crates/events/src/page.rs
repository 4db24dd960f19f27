//! Same-context publish/subscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::event::{NotificationEvent, Topic};
use crate::notifier::{Handler, HandlerRegistry, Notifier, Subscription};

/// Synchronous fan-out to subscribers living in one context.
///
/// `publish` stamps the event with this channel's origin and the next
/// sequence number, then calls each matching handler inline.
pub struct PageChannel {
    origin: String,
    sequence: AtomicU64,
    registry: Arc<HandlerRegistry>,
}

impl PageChannel {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            sequence: AtomicU64::new(0),
            registry: Arc::new(HandlerRegistry::default()),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Fill in `origin` and `sequence` unless the event already carries them.
    pub fn stamp(&self, mut event: NotificationEvent) -> NotificationEvent {
        if event.origin.is_none() {
            event.origin = Some(self.origin.clone());
            event.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        }
        event
    }

    /// Deliver an already-stamped event to local handlers.
    pub fn dispatch(&self, event: &NotificationEvent) {
        self.registry.dispatch(event);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry.handler_count(topic)
    }
}

impl Notifier for PageChannel {
    fn publish(&self, event: NotificationEvent) {
        let event = self.stamp(event);
        self.dispatch(&event);
    }

    fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        self.registry.register(topic, handler)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<NotificationEvent>>>, Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Handler = Arc::new(move |e: &NotificationEvent| {
            sink.lock().unwrap().push(e.clone());
        });
        (seen, handler)
    }

    #[test]
    fn delivers_only_matching_topic() {
        let page = PageChannel::new("tab-a");
        let (seen, handler) = recorder();
        let _sub = page.subscribe(Topic::RequestCreated, handler);

        page.publish(NotificationEvent::requests_cleared());
        page.publish(NotificationEvent::request_created(uuid::Uuid::now_v7()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic(), Topic::RequestCreated);
    }

    #[test]
    fn stamps_origin_and_increasing_sequence() {
        let page = PageChannel::new("tab-a");
        let (seen, handler) = recorder();
        let _sub = page.subscribe(Topic::RequestsCleared, handler);

        page.publish(NotificationEvent::requests_cleared());
        page.publish(NotificationEvent::requests_cleared());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].origin.as_deref(), Some("tab-a"));
        assert_eq!(seen[0].sequence, 1);
        assert_eq!(seen[1].sequence, 2);
    }

    #[test]
    fn keeps_foreign_stamp() {
        let page = PageChannel::new("tab-a");
        let mut event = NotificationEvent::requests_cleared();
        event.origin = Some("tab-b".into());
        event.sequence = 41;
        let stamped = page.stamp(event);
        assert_eq!(stamped.origin.as_deref(), Some("tab-b"));
        assert_eq!(stamped.sequence, 41);
    }

    #[test]
    fn no_delivery_after_unsubscribe() {
        let page = PageChannel::new("tab-a");
        let (seen, handler) = recorder();
        let mut sub = page.subscribe(Topic::RequestsCleared, handler);
        sub.unsubscribe();
        page.publish(NotificationEvent::requests_cleared());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(page.subscriber_count(Topic::RequestsCleared), 0);
    }
}
