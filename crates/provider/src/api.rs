//! REST client for the provider HTTP endpoints.
//!
//! `POST {base}/generate` queues a job, `GET {base}/status/{id}` reports on
//! it. An optional API key is sent as a bearer token.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{StatusReport, SubmitParams, SubmitResponse};
use crate::GenerationProvider;

/// Default provider base URL for local development.
const DEFAULT_API_URL: &str = "http://localhost:8188";

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Load from environment variables.
    ///
    /// | Variable               | Default                 |
    /// |------------------------|-------------------------|
    /// | `PROVIDER_API_URL`     | `http://localhost:8188` |
    /// | `PROVIDER_API_KEY`     | none                    |
    /// | `PROVIDER_TIMEOUT_SECS`| `30`                    |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("PROVIDER_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

/// HTTP client for one provider instance.
pub struct HttpProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            client,
            api_url: config.api_url,
            api_key: config.api_key,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Return the response unchanged on a 2xx, otherwise an
    /// [`ProviderError::Api`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn submit(&self, params: &SubmitParams) -> Result<SubmitResponse, ProviderError> {
        let response = self
            .authorize(self.client.post(format!("{}/generate", self.api_url)))
            .json(params)
            .send()
            .await?;

        // Providers report rejected prompts in a JSON body with a 4xx code.
        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Provider submit responded");
        if status.is_client_error() {
            let bytes = response.bytes().await?;
            if let Ok(body) = serde_json::from_slice::<SubmitResponse>(&bytes) {
                return Ok(body);
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Self::parse_response(response).await
    }

    async fn check_status(&self, job_id: &str) -> Result<StatusReport, ProviderError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/status/{}", self.api_url, job_id)),
            )
            .send()
            .await?;

        tracing::debug!(job_id, status = response.status().as_u16(), "Provider status responded");
        Self::parse_response(response).await
    }
}
