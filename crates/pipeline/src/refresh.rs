//! Request lists kept in sync with the store.
//!
//! Notifications only *trigger* a re-fetch; the list itself is always the
//! store's answer. A periodic re-fetch and a re-fetch on regained visibility
//! cover notifications that were delayed or never arrived.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brandgen_core::request::GenerationRequest;
use brandgen_core::types::UserId;
use brandgen_events::{Notifier, Subscription, Topic};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_REFRESH_INTERVAL;
use crate::lifecycle::RequestLifecycle;

/// Which requests a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// The admin queue.
    All,
    User(UserId),
}

/// A live list of requests for one view.
pub struct RequestListView {
    snapshot: watch::Receiver<Vec<GenerationRequest>>,
    trigger: Arc<Notify>,
    visible: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RequestListView {
    /// Start a view with the default 15 s backstop interval.
    pub fn spawn(
        lifecycle: Arc<RequestLifecycle>,
        notifier: &dyn Notifier,
        scope: ListScope,
    ) -> Self {
        Self::spawn_with_interval(lifecycle, notifier, scope, DEFAULT_REFRESH_INTERVAL)
    }

    /// Start a view. The first fetch happens immediately.
    pub fn spawn_with_interval(
        lifecycle: Arc<RequestLifecycle>,
        notifier: &dyn Notifier,
        scope: ListScope,
        interval: Duration,
    ) -> Self {
        let (tx, snapshot) = watch::channel(Vec::new());
        let trigger = Arc::new(Notify::new());

        let subscriptions: Vec<Subscription> = Topic::ALL
            .into_iter()
            .filter(|t| t.affects_request_lists())
            .map(|topic| {
                let trigger = Arc::clone(&trigger);
                notifier.subscribe(topic, Arc::new(move |_| trigger.notify_one()))
            })
            .collect();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            lifecycle,
            scope,
            interval,
            tx,
            Arc::clone(&trigger),
            cancel.clone(),
        ));

        Self {
            snapshot,
            trigger,
            visible: AtomicBool::new(true),
            subscriptions: Mutex::new(subscriptions),
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// The most recently fetched list.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.snapshot.borrow().clone()
    }

    /// A receiver that observes every refreshed list.
    pub fn watch(&self) -> watch::Receiver<Vec<GenerationRequest>> {
        self.snapshot.clone()
    }

    /// Ask for a re-fetch now.
    pub fn refresh(&self) {
        self.trigger.notify_one();
    }

    /// Record visibility changes; becoming visible again forces a re-fetch.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::SeqCst);
        if visible && !was_visible {
            self.refresh();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Deregister from the notifier and stop the refresh task.
    pub async fn shutdown(&self) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for RequestListView {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh_loop(
    lifecycle: Arc<RequestLifecycle>,
    scope: ListScope,
    period: Duration,
    tx: watch::Sender<Vec<GenerationRequest>>,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            // The first tick completes immediately: initial load.
            _ = interval.tick() => {}
            _ = trigger.notified() => {}
        }

        let fetched = match scope {
            ListScope::All => lifecycle.list_all_requests().await,
            ListScope::User(user_id) => lifecycle.list_requests_for_user(user_id).await,
        };
        match fetched {
            Ok(list) => {
                tx.send_replace(list);
            }
            Err(e) => {
                tracing::warn!(error = %e, ?scope, "Request list refresh failed, keeping last list");
            }
        }
    }
    tracing::debug!(?scope, "Request list view stopped");
}
