//! Forwards notifier events to every WebSocket connection.

use std::sync::Arc;

use brandgen_events::{NotificationEvent, Notifier, Subscription, Topic};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ws::manager::WsManager;

/// Subscribed to every topic until [`shutdown`](Self::shutdown) or drop.
pub struct EventBridge {
    subscriptions: Vec<Subscription>,
    task: Option<JoinHandle<()>>,
}

impl EventBridge {
    /// Subscribe to all topics on `notifier` and start forwarding.
    ///
    /// Notifier handlers run synchronously on the publisher's task, so they
    /// only queue the event; a separate task does the socket writes.
    pub fn spawn(notifier: &dyn Notifier, ws_manager: Arc<WsManager>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NotificationEvent>();

        let subscriptions = Topic::ALL
            .into_iter()
            .map(|topic| {
                let tx = tx.clone();
                notifier.subscribe(
                    topic,
                    Arc::new(move |event: &NotificationEvent| {
                        let _ = tx.send(event.clone());
                    }),
                )
            })
            .collect();

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                ws_manager.broadcast_event(&event).await;
            }
            tracing::debug!("Event bridge stopped");
        });

        Self {
            subscriptions,
            task: Some(task),
        }
    }

    /// Deregister from the notifier and let queued events drain.
    pub async fn shutdown(mut self) {
        self.subscriptions.clear();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.subscriptions.clear();
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
