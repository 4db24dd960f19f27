//! Webhook alerts with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`RequestAlert`] to one
//! configured URL. Failed attempts are retried three times with exponential
//! backoff (1 s, 2 s, 4 s).

use std::time::Duration;

use async_trait::async_trait;

use super::{AlertSender, DeliveryError, RequestAlert};

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
}

impl WebhookDelivery {
    /// Build a delivery service for `url` with its own HTTP client.
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Reads `ALERT_WEBHOOK_URL`; `None` when unset.
    pub fn from_env() -> Option<Result<Self, WebhookError>> {
        std::env::var("ALERT_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an alert with retry. Returns `Ok(())` on the first success.
    pub async fn deliver(&self, alert: &RequestAlert) -> Result<(), WebhookError> {
        let payload = payload(alert);
        let url = self.url.as_str();

        let mut last_err: Option<WebhookError> = None;

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(url, error = %e, "Webhook delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }

    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSender for WebhookDelivery {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &RequestAlert) -> Result<(), DeliveryError> {
        Ok(self.deliver(alert).await?)
    }
}

fn payload(alert: &RequestAlert) -> serde_json::Value {
    serde_json::json!({
        "event_type": alert.kind.as_str(),
        "request_id": alert.request_id,
        "user_name": alert.user_name,
        "prompt": alert.prompt,
        "result_url": alert.result_url,
        "timestamp": alert.timestamp,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::delivery::AlertKind;

    #[test]
    fn new_builds_client() {
        let delivery = WebhookDelivery::new("https://hooks.example.com/brandgen").unwrap();
        assert_eq!(delivery.url(), "https://hooks.example.com/brandgen");
    }

    #[test]
    fn payload_carries_event_type_and_ids() {
        let alert = RequestAlert {
            kind: AlertKind::RequestCompleted,
            request_id: uuid::Uuid::now_v7(),
            user_name: "Ana".into(),
            user_email: Some("ana@example.com".into()),
            prompt: "neon logo".into(),
            result_url: Some("https://cdn/x.png".into()),
            timestamp: Utc::now(),
        };
        let body = payload(&alert);
        assert_eq!(body["event_type"], "request_completed");
        assert_eq!(body["request_id"], alert.request_id.to_string());
        assert_eq!(body["result_url"], "https://cdn/x.png");
        // The requester's address stays out of third-party payloads.
        assert!(body.get("user_email").is_none());
    }

    #[test]
    fn webhook_error_display_http_status() {
        let err = WebhookError::HttpStatus(502);
        assert_eq!(err.to_string(), "Webhook returned HTTP 502");
    }

    #[test]
    fn webhook_error_display_request() {
        let req_err = reqwest::Client::new().get("://bad").build().unwrap_err();
        let err = WebhookError::Request(req_err);
        assert!(err.to_string().contains("HTTP request failed"));
    }
}
