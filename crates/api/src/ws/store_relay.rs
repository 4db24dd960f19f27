//! Turns the store's change feed into notifier events.
//!
//! With a shared Postgres store, other server processes write requests this
//! process never hears about. Their changes arrive on the change feed and
//! are re-published here. Writes made by this process show up twice, which
//! list refreshes tolerate.

use std::sync::Arc;

use brandgen_db::store::{RequestStore, StoreChange};
use brandgen_events::{NotificationEvent, Notifier};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub fn spawn_store_relay(
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = store.subscribe_changes();

    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                _ = cancel.cancelled() => break,
                change = changes.recv() => change,
            };

            match change {
                Ok(change) => {
                    if let Some(event) = to_event(store.as_ref(), change).await {
                        notifier.publish(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed changes may include a clear; a full refresh covers anything.
                    tracing::warn!(skipped, "Store change feed lagged");
                    notifier.publish(NotificationEvent::requests_cleared());
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Store relay stopped");
    })
}

async fn to_event(store: &dyn RequestStore, change: StoreChange) -> Option<NotificationEvent> {
    match change {
        StoreChange::Inserted(id) => Some(NotificationEvent::request_created(id)),
        StoreChange::Updated(id) => match store.find_by_id(id).await {
            Ok(Some(request)) => Some(NotificationEvent::request_updated(id, request.status)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "Could not read changed request");
                None
            }
        },
        StoreChange::Removed(_) | StoreChange::Cleared => {
            Some(NotificationEvent::requests_cleared())
        }
    }
}
