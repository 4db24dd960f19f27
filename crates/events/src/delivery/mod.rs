//! Outbound alerts on request creation and completion.
//!
//! Alerts are a side channel: they are spawned onto the runtime and their
//! failures are logged, never returned to the lifecycle operation that
//! triggered them.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use brandgen_core::request::GenerationRequest;
use brandgen_core::types::{RequestId, Timestamp};
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

pub use email::{EmailConfig, EmailDelivery, EmailError};
pub use webhook::{WebhookDelivery, WebhookError};

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RequestCreated,
    RequestCompleted,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestCreated => "request_created",
            Self::RequestCompleted => "request_completed",
        }
    }
}

/// What an alert says about a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestAlert {
    pub kind: AlertKind,
    pub request_id: RequestId,
    pub user_name: String,
    pub user_email: Option<String>,
    pub prompt: String,
    pub result_url: Option<String>,
    pub timestamp: Timestamp,
}

impl RequestAlert {
    pub fn created(request: &GenerationRequest) -> Self {
        Self::from_request(AlertKind::RequestCreated, request)
    }

    pub fn completed(request: &GenerationRequest) -> Self {
        Self::from_request(AlertKind::RequestCompleted, request)
    }

    fn from_request(kind: AlertKind, request: &GenerationRequest) -> Self {
        Self {
            kind,
            request_id: request.id,
            user_name: request.user_name.clone(),
            user_email: request.user_email.clone(),
            prompt: request.prompt.clone(),
            result_url: request.result_url.clone(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

/// A destination for [`RequestAlert`]s.
#[async_trait]
pub trait AlertSender: Send + Sync {
    /// Short name used in logs.
    fn channel(&self) -> &'static str;

    async fn send(&self, alert: &RequestAlert) -> Result<(), DeliveryError>;
}

/// Deliver `alert` in the background. Failures are logged.
pub fn spawn_alert(sender: Arc<dyn AlertSender>, alert: RequestAlert) -> JoinHandle<()> {
    tokio::spawn(async move {
        match sender.send(&alert).await {
            Ok(()) => tracing::debug!(
                channel = sender.channel(),
                kind = alert.kind.as_str(),
                request_id = %alert.request_id,
                "Alert delivered",
            ),
            Err(e) => tracing::warn!(
                channel = sender.channel(),
                kind = alert.kind.as_str(),
                request_id = %alert.request_id,
                error = %e,
                "Alert delivery failed",
            ),
        }
    })
}

/// The configured alert destinations. Empty means alerts are disabled.
#[derive(Clone, Default)]
pub struct Alerts {
    senders: Vec<Arc<dyn AlertSender>>,
}

impl Alerts {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, sender: Arc<dyn AlertSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Fire `alert` at every destination without waiting.
    pub fn notify(&self, alert: RequestAlert) {
        for sender in &self.senders {
            spawn_alert(Arc::clone(sender), alert.clone());
        }
    }
}
