//! Email alerts via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport to send plain-text
//! alert emails. Configuration is loaded from environment variables; if
//! `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and no
//! mailer should be constructed.

use async_trait::async_trait;

use super::{AlertKind, AlertSender, DeliveryError, RequestAlert};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@brandgen.local";

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
    /// Operator inbox for new-request alerts.
    pub alert_address: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    ///
    /// | Variable        | Required | Default                   |
    /// |-----------------|----------|---------------------------|
    /// | `SMTP_HOST`     | yes      | --                        |
    /// | `SMTP_PORT`     | no       | `587`                     |
    /// | `SMTP_FROM`     | no       | `noreply@brandgen.local`  |
    /// | `SMTP_USER`     | no       | --                        |
    /// | `SMTP_PASSWORD` | no       | --                        |
    /// | `ALERT_EMAIL`   | no       | --                        |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
            alert_address: std::env::var("ALERT_EMAIL").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends request alerts by email.
///
/// New requests go to the operator inbox; completions go to the requester,
/// falling back to the operator inbox when the requester has no address.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Recipient for `alert`, or `None` when nobody should be mailed.
    pub fn recipient_for<'a>(&'a self, alert: &'a RequestAlert) -> Option<&'a str> {
        match alert.kind {
            AlertKind::RequestCreated => self.config.alert_address.as_deref(),
            AlertKind::RequestCompleted => alert
                .user_email
                .as_deref()
                .or(self.config.alert_address.as_deref()),
        }
    }

    /// Send one alert email to `to_email`.
    pub async fn deliver(&self, to_email: &str, alert: &RequestAlert) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let (subject, body) = render(alert);

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(to = to_email, kind = alert.kind.as_str(), "Alert email sent");
        Ok(())
    }
}

#[async_trait]
impl AlertSender for EmailDelivery {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &RequestAlert) -> Result<(), DeliveryError> {
        match self.recipient_for(alert) {
            Some(to) => Ok(self.deliver(to, alert).await?),
            None => {
                tracing::debug!(kind = alert.kind.as_str(), "No recipient for alert email");
                Ok(())
            }
        }
    }
}

/// Subject and plain-text body for an alert.
fn render(alert: &RequestAlert) -> (String, String) {
    match alert.kind {
        AlertKind::RequestCreated => (
            format!("[Brandgen] New request from {}", alert.user_name),
            format!(
                "Request: {}\nFrom: {}\nTime: {}\nPrompt: {}",
                alert.request_id, alert.user_name, alert.timestamp, alert.prompt
            ),
        ),
        AlertKind::RequestCompleted => (
            "[Brandgen] Your image is ready".to_string(),
            format!(
                "Request: {}\nPrompt: {}\nResult: {}",
                alert.request_id,
                alert.prompt,
                alert.result_url.as_deref().unwrap_or("-")
            ),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
