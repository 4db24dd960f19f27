//! The request store contract and its implementations.
//!
//! The store is the single source of truth for generation requests. Writers
//! from any context go through [`RequestStore::update_by_id`] with a complete,
//! already-validated patch. The write only lands if the stored status is still
//! the one the patch was computed from; otherwise it fails with
//! [`StoreError::StatusChanged`] and nothing is written.

mod memory;
mod postgres;

pub use memory::InMemoryRequestStore;
pub use postgres::PgRequestStore;

use async_trait::async_trait;
use brandgen_core::request::{GenerationRequest, RequestStatus};
use brandgen_core::types::{RequestId, Timestamp, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the change-feed broadcast channel.
pub const CHANGE_FEED_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generation request {0} not found")]
    NotFound(RequestId),

    #[error("Generation request {0} already exists")]
    Duplicate(RequestId),

    #[error("Stored request is malformed: {0}")]
    Corrupt(String),

    #[error("Generation request {id} is no longer {expected}")]
    StatusChanged {
        id: RequestId,
        expected: RequestStatus,
    },
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// A push notification from the store's change feed. Best effort only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "id", rename_all = "lowercase")]
pub enum StoreChange {
    Inserted(RequestId),
    Updated(RequestId),
    Removed(RequestId),
    Cleared,
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// The mutable columns of a request, written as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPatch {
    pub status: RequestStatus,
    pub result_url: Option<String>,
    pub placeholder_url: Option<String>,
    pub provider_job_id: Option<String>,
    pub progress: Option<u8>,
    pub error_message: Option<String>,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<&GenerationRequest> for RequestPatch {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            status: req.status,
            result_url: req.result_url.clone(),
            placeholder_url: req.placeholder_url.clone(),
            provider_job_id: req.provider_job_id.clone(),
            progress: req.progress,
            error_message: req.error_message.clone(),
            updated_at: req.updated_at,
            completed_at: req.completed_at,
        }
    }
}

impl RequestPatch {
    /// Apply this patch onto an existing record.
    pub fn apply_to(&self, req: &mut GenerationRequest) {
        req.status = self.status;
        req.result_url = self.result_url.clone();
        req.placeholder_url = self.placeholder_url.clone();
        req.provider_job_id = self.provider_job_id.clone();
        req.progress = self.progress;
        req.error_message = self.error_message.clone();
        req.updated_at = self.updated_at;
        req.completed_at = self.completed_at;
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Durable record of generation requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: &GenerationRequest) -> Result<(), StoreError>;

    /// Write `patch` onto request `id` if its stored status is still
    /// `expected`, and return the stored result.
    async fn update_by_id(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<GenerationRequest, StoreError>;

    async fn find_by_id(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError>;

    /// All requests ordered by creation time, most recent first.
    async fn list_all(&self) -> Result<Vec<GenerationRequest>, StoreError>;

    /// One user's requests ordered by creation time, most recent first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<GenerationRequest>, StoreError>;

    /// Delete everything. Returns the number of removed requests.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    /// Subscribe to the best-effort change feed.
    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange>;
}
