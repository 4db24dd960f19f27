//! Brandgen cross-context notification infrastructure.
//!
//! - [`NotificationEvent`] -- the event envelope; its [`EventPayload`] fixes
//!   the topic.
//! - [`Notifier`] -- the publish/subscribe seam every component is handed.
//! - [`PageChannel`] -- synchronous fan-out within one context.
//! - [`BroadcastHub`] / [`BroadcastChannel`] -- named channel between
//!   contexts; a message reaches every *other* open handle.
//! - [`CrossContextNotifier`] -- publishes on both legs and re-dispatches
//!   messages from other contexts locally.
//! - [`delivery`] -- fire-and-forget alert delivery (email, webhook).

pub mod broadcast;
pub mod cross_context;
pub mod delivery;
pub mod event;
pub mod notifier;
pub mod page;

pub use broadcast::{BroadcastChannel, BroadcastError, BroadcastHub, BroadcastPoster};
pub use cross_context::{CrossContextNotifier, BROADCAST_CHANNEL_NAME};
pub use delivery::{spawn_alert, AlertKind, AlertSender, Alerts, RequestAlert};
pub use event::{EventPayload, NotificationEvent, Topic};
pub use notifier::{Handler, Notifier, Subscription};
pub use page::PageChannel;
