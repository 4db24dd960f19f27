//! The publish/subscribe seam and its handler registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::event::{NotificationEvent, Topic};

/// A subscriber callback. Must be idempotent: the same logical event can
/// arrive more than once and out of order.
pub type Handler = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// Publish/subscribe over [`Topic`]s.
///
/// Components receive a notifier explicitly (usually `Arc<dyn Notifier>`)
/// instead of reaching for a global bus.
pub trait Notifier: Send + Sync {
    /// Fire-and-forget. Never fails and never blocks on subscribers beyond
    /// the synchronous handler calls.
    fn publish(&self, event: NotificationEvent);

    /// Register `handler` for `topic`. The handler stays registered until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Topic → handlers table shared by the local notifier implementations.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<Topic, Vec<(u64, Handler)>>>,
}

impl HandlerRegistry {
    pub(crate) fn register(self: &Arc<Self>, topic: Topic, handler: Handler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().entry(topic).or_default().push((id, handler));
        Subscription {
            registry: Arc::downgrade(self),
            topic,
            id,
            active: true,
        }
    }

    /// Call every handler registered for the event's topic.
    ///
    /// Handlers are cloned out of the lock first, so a handler may publish or
    /// (un)subscribe without deadlocking.
    pub(crate) fn dispatch(&self, event: &NotificationEvent) {
        let handlers: Vec<Handler> = self
            .lock()
            .get(&event.topic())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(event);
        }
    }

    pub(crate) fn handler_count(&self, topic: Topic) -> usize {
        self.lock().get(&topic).map_or(0, Vec::len)
    }

    fn remove(&self, topic: Topic, id: u64) {
        let mut handlers = self.lock();
        if let Some(list) = handlers.get_mut(&topic) {
            list.retain(|(hid, _)| *hid != id);
            if list.is_empty() {
                handlers.remove(&topic);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, Vec<(u64, Handler)>>> {
        // Handlers run outside the lock; a poisoned map is still consistent.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Registration handle returned by [`Notifier::subscribe`].
///
/// Dropping it deregisters the handler.
#[must_use = "dropping a Subscription immediately unsubscribes the handler"]
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    topic: Topic,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Deregister now. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_subscription_removes_handler() {
        let registry = Arc::new(HandlerRegistry::default());
        let sub = registry.register(Topic::RequestCreated, Arc::new(|_| {}));
        assert_eq!(registry.handler_count(Topic::RequestCreated), 1);
        drop(sub);
        assert_eq!(registry.handler_count(Topic::RequestCreated), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = Arc::new(HandlerRegistry::default());
        let mut a = registry.register(Topic::RequestUpdated, Arc::new(|_| {}));
        let _b = registry.register(Topic::RequestUpdated, Arc::new(|_| {}));
        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(registry.handler_count(Topic::RequestUpdated), 1);
    }

    #[test]
    fn handler_may_unsubscribe_during_dispatch() {
        let registry = Arc::new(HandlerRegistry::default());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_handler = Arc::clone(&slot);
        let sub = registry.register(
            Topic::RequestsCleared,
            Arc::new(move |_| {
                slot_in_handler.lock().unwrap().take();
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        registry.dispatch(&NotificationEvent::requests_cleared());
        assert_eq!(registry.handler_count(Topic::RequestsCleared), 0);
    }
}
