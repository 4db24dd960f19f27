//! Named channels between contexts.
//!
//! A [`BroadcastHub`] plays the role of the origin-wide broadcast primitive:
//! every [`BroadcastChannel`] opened under the same name can post to, and
//! receive from, every other open handle of that name. A handle never sees
//! its own messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::event::NotificationEvent;

/// Buffered messages per channel name before slow handles start lagging.
pub const CHANNEL_CAPACITY: usize = 256;

type Envelope = (u64, NotificationEvent);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Broadcast channel '{0}' is closed")]
    Closed(String),
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Registry of named broadcast channels. Cheap to clone.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    next_handle: AtomicU64,
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new handle on channel `name`.
    pub fn open(&self, name: &str) -> BroadcastChannel {
        let handle_id = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        let sender = {
            let mut channels = self
                .inner
                .channels
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .clone()
        };
        let receiver = sender.subscribe();

        BroadcastChannel {
            poster: BroadcastPoster {
                name: name.to_string(),
                handle_id,
                sender,
                closed: CancellationToken::new(),
            },
            receiver,
        }
    }

    /// Number of handles currently open on `name`.
    pub fn open_handles(&self, name: &str) -> usize {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map_or(0, |s| s.receiver_count())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// The sending half of a handle. Clones share the handle's identity and its
/// closed state.
#[derive(Clone)]
pub struct BroadcastPoster {
    name: String,
    handle_id: u64,
    sender: broadcast::Sender<Envelope>,
    closed: CancellationToken,
}

impl BroadcastPoster {
    /// Send `event` to every other open handle on this channel.
    pub fn post(&self, event: NotificationEvent) -> Result<(), BroadcastError> {
        if self.closed.is_cancelled() {
            return Err(BroadcastError::Closed(self.name.clone()));
        }
        // No other handle open: nothing to deliver.
        let _ = self.sender.send((self.handle_id, event));
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }
}

/// One open handle on a named channel.
///
/// Must be closed when its owner goes away; dropping it closes it.
pub struct BroadcastChannel {
    poster: BroadcastPoster,
    receiver: broadcast::Receiver<Envelope>,
}

impl BroadcastChannel {
    pub fn name(&self) -> &str {
        &self.poster.name
    }

    pub fn post(&self, event: NotificationEvent) -> Result<(), BroadcastError> {
        self.poster.post(event)
    }

    /// A sending half that can live on another task.
    pub fn poster(&self) -> BroadcastPoster {
        self.poster.clone()
    }

    /// Next message from another handle, or `None` once this handle is closed.
    ///
    /// A handle that falls more than [`CHANNEL_CAPACITY`] messages behind
    /// skips the missed ones; the periodic refresh covers the gap.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.poster.closed.cancelled() => return None,
                r = self.receiver.recv() => r,
            };
            match received {
                Ok((from, _)) if from == self.poster.handle_id => continue,
                Ok((_, event)) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(channel = %self.poster.name, missed, "Broadcast handle lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn close(&self) {
        self.poster.close();
    }

    pub fn is_closed(&self) -> bool {
        self.poster.is_closed()
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        self.close();
    }
}
