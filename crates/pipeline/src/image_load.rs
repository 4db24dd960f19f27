//! Image loading tied to the notifier.
//!
//! [`ImageLoadSession`] wraps the pure [`ImageLoadController`] for one pending
//! image. A manual retry also publishes `generation-retry`, so the generation
//! side can poll again or re-generate.

use std::sync::Arc;

use brandgen_core::image_load::{
    ErrorOutcome, ImageLoadConfig, ImageLoadController, LoadPhase, RetryReason,
};
use brandgen_core::types::RequestId;
use brandgen_events::{NotificationEvent, Notifier};
use tokio::time::Instant;

pub struct ImageLoadSession {
    controller: ImageLoadController,
    notifier: Arc<dyn Notifier>,
    request_id: Option<RequestId>,
    prompt: String,
    url: String,
}

impl ImageLoadSession {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        request_id: Option<RequestId>,
        prompt: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::with_config(notifier, request_id, prompt, url, ImageLoadConfig::default())
    }

    pub fn with_config(
        notifier: Arc<dyn Notifier>,
        request_id: Option<RequestId>,
        prompt: impl Into<String>,
        url: impl Into<String>,
        config: ImageLoadConfig,
    ) -> Self {
        Self {
            controller: ImageLoadController::new(config),
            notifier,
            request_id,
            prompt: prompt.into(),
            url: url.into(),
        }
    }

    pub fn controller(&self) -> &ImageLoadController {
        &self.controller
    }

    pub fn phase(&self) -> LoadPhase {
        self.controller.phase()
    }

    pub fn progress(&self) -> f64 {
        self.controller.progress()
    }

    /// URL to load, with a cache-busting suffix once the image was reloaded.
    pub fn src(&self) -> String {
        match self.controller.cache_key() {
            0 => self.url.clone(),
            key => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}retry={}", self.url, sep, key)
            }
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.controller.start(now);
    }

    /// Advance timers; `Some` means the image must be reloaded from [`src`](Self::src).
    pub fn tick(&mut self, now: Instant) -> Option<RetryReason> {
        let reason = self.controller.tick(now);
        if let Some(reason) = reason {
            tracing::debug!(
                request_id = ?self.request_id,
                ?reason,
                attempt = self.controller.cache_key(),
                "Reloading image",
            );
        }
        reason
    }

    pub fn on_load(&mut self) {
        self.controller.on_load();
    }

    pub fn on_error(&mut self, now: Instant) -> ErrorOutcome {
        let outcome = self.controller.on_error(now);
        tracing::debug!(request_id = ?self.request_id, ?outcome, "Image failed to load");
        outcome
    }

    /// User-initiated retry: reset the image and ask for regeneration.
    pub fn manual_retry(&mut self, now: Instant) -> RetryReason {
        let reason = self.controller.manual_retry(now);
        self.notifier.publish(NotificationEvent::generation_retry(
            self.request_id,
            self.prompt.clone(),
        ));
        reason
    }
}
