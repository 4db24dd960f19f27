//! Generation request model and its status state machine.
//!
//! ```text
//!   new ──► in-progress ──► completed
//!    │           │
//!    └──► failed ◄┘
//! ```
//!
//! `completed` and `failed` are terminal. Every mutation goes through a
//! method on [`GenerationRequest`] that returns a new, fully consistent
//! record, so callers never assemble a partial transition by hand.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_request_id, RequestId, Timestamp, UserId};
use crate::validation::{
    validate_aspect_ratio, validate_batch_size, validate_prompt, validate_reference_image,
};

/// Highest progress value a non-completed request may report.
pub const MAX_PENDING_PROGRESS: u8 = 99;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    New,
    InProgress,
    Completed,
    Failed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::New,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Failed,
    ];

    /// Wire / database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The single source of truth for legal transitions.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::InProgress)
                | (Self::New, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid status '{s}'. Must be one of: new, in-progress, completed, failed"
                ))
            })
    }
}

/// Reject a transition that is not an edge of the status graph.
pub fn validate_transition(from: RequestStatus, to: RequestStatus) -> Result<(), CoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What the request asks the provider to generate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Image,
    Video,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for RequestKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(CoreError::Validation(format!(
                "Invalid request kind '{other}'. Must be one of: image, video"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// The authenticated caller creating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
}

/// User-supplied fields for a new request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGenerationRequest {
    #[serde(default)]
    pub kind: RequestKind,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub reference_image: Option<String>,
    pub style: Option<String>,
    pub batch_size: Option<u8>,
}

impl NewGenerationRequest {
    /// Convenience constructor for an image request with just a prompt.
    pub fn image(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// A single user-initiated ask for a generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: Option<String>,
    pub kind: RequestKind,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub reference_image: Option<String>,
    pub style: Option<String>,
    pub batch_size: u8,
    pub status: RequestStatus,
    /// Final artifact. Present iff `status == completed`.
    pub result_url: Option<String>,
    /// Temporary image shown while the provider works. Never set on terminal requests.
    pub placeholder_url: Option<String>,
    pub provider_job_id: Option<String>,
    pub progress: Option<u8>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Present iff `status == completed`.
    pub completed_at: Option<Timestamp>,
}

impl GenerationRequest {
    /// Validate `input` and build a request in status `new`.
    pub fn create(
        requester: &Requester,
        input: NewGenerationRequest,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        if requester.user_id.is_nil() {
            return Err(CoreError::Unauthorized(
                "A signed-in user is required to create a request".to_string(),
            ));
        }
        let prompt = validate_prompt(&input.prompt)?;
        let aspect_ratio = validate_aspect_ratio(input.aspect_ratio.as_deref())?;
        let reference_image = validate_reference_image(input.reference_image.as_deref())?;
        let batch_size = validate_batch_size(input.batch_size)?;

        Ok(Self {
            id: new_request_id(),
            user_id: requester.user_id,
            user_name: requester.name.clone(),
            user_email: requester.email.clone(),
            kind: input.kind,
            prompt,
            aspect_ratio,
            reference_image,
            style: input.style.filter(|s| !s.trim().is_empty()),
            batch_size,
            status: RequestStatus::New,
            result_url: None,
            placeholder_url: None,
            provider_job_id: None,
            progress: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition, returning the updated record.
    ///
    /// Entering `completed` requires a non-empty `result_url` and stamps
    /// `completed_at`; a `result_url` is rejected for every other target.
    pub fn transition(
        &self,
        next: RequestStatus,
        result_url: Option<&str>,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        validate_transition(self.status, next)?;

        let result_url = result_url.map(str::trim).filter(|u| !u.is_empty());
        let mut updated = self.clone();

        match next {
            RequestStatus::Completed => {
                let url = result_url.ok_or_else(|| {
                    CoreError::Validation(
                        "A result URL is required to complete a request".to_string(),
                    )
                })?;
                updated.result_url = Some(url.to_string());
                updated.completed_at = Some(now);
                updated.progress = Some(100);
                updated.placeholder_url = None;
                updated.error_message = None;
            }
            other => {
                if result_url.is_some() {
                    return Err(CoreError::Validation(format!(
                        "A result URL can only be attached when completing, not when moving to {other}"
                    )));
                }
                if other.is_terminal() {
                    updated.placeholder_url = None;
                }
            }
        }

        updated.status = next;
        updated.updated_at = now;
        Ok(updated)
    }

    /// The provider accepted the job: `new -> in-progress`.
    pub fn submitted(
        &self,
        provider_job_id: &str,
        placeholder_url: Option<&str>,
        now: Timestamp,
    ) -> Result<Self, CoreError> {
        let mut updated = self.transition(RequestStatus::InProgress, None, now)?;
        updated.provider_job_id = Some(provider_job_id.to_string());
        updated.placeholder_url = placeholder_url.map(str::to_string);
        updated.progress = Some(0);
        Ok(updated)
    }

    /// Move to `failed`, recording why.
    pub fn failed(&self, message: &str, now: Timestamp) -> Result<Self, CoreError> {
        let mut updated = self.transition(RequestStatus::Failed, None, now)?;
        updated.error_message = Some(message.to_string());
        Ok(updated)
    }

    /// Record a progress estimate on a non-terminal request.
    ///
    /// Values are clamped to [`MAX_PENDING_PROGRESS`] and never move backwards.
    pub fn with_progress(&self, progress: u8, now: Timestamp) -> Result<Self, CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Request {} is already {}",
                self.id, self.status
            )));
        }
        let clamped = progress.min(MAX_PENDING_PROGRESS);
        let mut updated = self.clone();
        updated.progress = Some(self.progress.map_or(clamped, |p| p.max(clamped)));
        updated.updated_at = now;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
