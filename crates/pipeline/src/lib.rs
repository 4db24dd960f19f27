//! The generation-request pipeline.
//!
//! [`lifecycle::RequestLifecycle`] owns every write to the request store and
//! publishes the matching notifications. Around it:
//!
//! - [`poller`] polls the provider for one job with a bounded retry budget.
//! - [`generation`] submits new requests and reacts to retry signals.
//! - [`admin`] is the manual fulfillment path.
//! - [`refresh`] keeps a request list in sync from events plus a periodic
//!   re-fetch.
//! - [`image_load`] ties the image-load state machine to the notifier.
//! - [`artifacts`] stores uploaded results by content address.

pub mod admin;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod generation;
pub mod image_load;
pub mod lifecycle;
pub mod poller;
pub mod refresh;

pub use error::PipelineError;
