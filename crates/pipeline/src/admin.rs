//! Admin review: the manual fulfillment path.

use std::sync::Arc;

use brandgen_core::error::CoreError;
use brandgen_core::request::{validate_transition, GenerationRequest, RequestStatus};
use brandgen_core::types::RequestId;

use crate::artifacts::{ArtifactStore, StoredArtifact};
use crate::error::PipelineError;
use crate::lifecycle::RequestLifecycle;

/// Explicit acknowledgement required before wiping every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearConfirmation {
    Confirmed,
    NotConfirmed,
}

impl From<bool> for ClearConfirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::NotConfirmed
        }
    }
}

pub struct AdminReview {
    lifecycle: Arc<RequestLifecycle>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl AdminReview {
    pub fn new(lifecycle: Arc<RequestLifecycle>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            lifecycle,
            artifacts,
        }
    }

    /// Every request, most recent first, optionally only those in `status`.
    pub async fn queue(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<GenerationRequest>, PipelineError> {
        let mut all = self.lifecycle.list_all_requests().await?;
        if let Some(status) = status {
            all.retain(|r| r.status == status);
        }
        Ok(all)
    }

    pub async fn set_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        result_url: Option<&str>,
    ) -> Result<GenerationRequest, PipelineError> {
        tracing::info!(request_id = %id, to = %status, "Admin status change");
        self.lifecycle.update_status(id, status, result_url).await
    }

    /// Store an uploaded result and complete the request with its URL.
    ///
    /// A `new` request is first moved to `in-progress`, so the record still
    /// follows the transition graph. Terminal requests are refused before
    /// anything is stored.
    pub async fn attach_result(
        &self,
        id: RequestId,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(GenerationRequest, StoredArtifact), PipelineError> {
        let current = self.lifecycle.get_request(id).await?;
        validate_transition(
            match current.status {
                RequestStatus::New => RequestStatus::InProgress,
                other => other,
            },
            RequestStatus::Completed,
        )?;

        let artifact = self.artifacts.put(bytes, content_type).await?;

        if current.status == RequestStatus::New {
            self.lifecycle
                .update_status(id, RequestStatus::InProgress, None)
                .await?;
        }
        let completed = self
            .lifecycle
            .update_status(id, RequestStatus::Completed, Some(&artifact.url))
            .await?;

        tracing::info!(request_id = %id, key = %artifact.key, "Admin attached result");
        Ok((completed, artifact))
    }

    /// Delete every request once confirmed.
    pub async fn clear_all(&self, confirmation: ClearConfirmation) -> Result<u64, PipelineError> {
        match confirmation {
            ClearConfirmation::Confirmed => self.lifecycle.clear_all().await,
            ClearConfirmation::NotConfirmed => Err(CoreError::Validation(
                "Clearing all requests must be explicitly confirmed".to_string(),
            )
            .into()),
        }
    }
}
