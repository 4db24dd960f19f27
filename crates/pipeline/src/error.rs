use brandgen_core::error::CoreError;
use brandgen_db::store::StoreError;

use crate::artifacts::ArtifactError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::Core(CoreError::request_not_found(id)),
            StoreError::StatusChanged { id, expected } => Self::Core(CoreError::Conflict(format!(
                "generation request {id} changed while being updated (was {expected})"
            ))),
            other => Self::Store(other),
        }
    }
}

impl PipelineError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(e) => Some(e),
            _ => None,
        }
    }

    /// `true` when the target request does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(CoreError::NotFound { .. }))
    }

    /// `true` when the request's current status did not allow the change.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::Core(CoreError::InvalidTransition { .. } | CoreError::Conflict(_))
        )
    }
}
