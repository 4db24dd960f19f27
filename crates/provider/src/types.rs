//! Wire types for the provider API and their interpretation.

use serde::{Deserialize, Serialize};

use crate::placeholder::is_placeholder_url;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitParams {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    pub batch_size: u8,
}

impl SubmitParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: None,
            style: None,
            reference_image: None,
            batch_size: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Accepted,
    Error,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: SubmitStatus,
    #[serde(default, alias = "requestId", alias = "id")]
    pub request_id: Option<String>,
    #[serde(default, alias = "placeholderUrl")]
    pub placeholder_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SubmitResponse {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Accepted,
            request_id: Some(job_id.into()),
            placeholder_url: None,
            error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Error,
            request_id: None,
            placeholder_url: None,
            error: Some(message.into()),
        }
    }

    pub fn with_placeholder(mut self, url: impl Into<String>) -> Self {
        self.placeholder_url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Body of `GET /status/{id}`. Every field is optional because providers are
/// not consistent about what they send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "resultUrl", alias = "url", alias = "image_url")]
    pub result_url: Option<String>,
    #[serde(default, alias = "message")]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl StatusReport {
    pub fn processing() -> Self {
        Self {
            status: Some("processing".into()),
            ..Self::default()
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: Some("completed".into()),
            result_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some("error".into()),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Decide what this report means for the job.
    ///
    /// A concrete, non-placeholder URL wins over whatever the status string
    /// says. An explicit error status is final. Anything else, including an
    /// unknown or missing status, is still in progress.
    pub fn classify(&self) -> JobStatus {
        if let Some(url) = self
            .result_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !is_placeholder_url(u))
        {
            return JobStatus::Completed {
                url: url.to_string(),
            };
        }

        let progress = self
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0).round() as u8);

        match self.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("error" | "failed" | "failure") => JobStatus::Failed {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "The provider reported an error".to_string()),
            },
            Some("processing" | "accepted" | "queued" | "pending" | "running" | "completed") => {
                JobStatus::Processing { progress }
            }
            _ => JobStatus::Ambiguous,
        }
    }
}

/// The poller's view of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Still working. `progress` is the provider's estimate when it sent one.
    Processing { progress: Option<u8> },
    Completed { url: String },
    Failed { message: String },
    /// No recognizable status; treated like `Processing`.
    Ambiguous,
}
