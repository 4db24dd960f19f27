//! Row model for the `generation_requests` table.

use brandgen_core::request::{GenerationRequest, RequestKind, RequestStatus};
use brandgen_core::types::{RequestId, Timestamp, UserId};
use sqlx::FromRow;

/// A row from the `generation_requests` table.
///
/// Enumerations are stored as text; conversion into the domain type
/// re-validates them so a hand-edited row cannot smuggle in an unknown status.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRequestRow {
    pub id: RequestId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: Option<String>,
    pub kind: String,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub reference_image: Option<String>,
    pub style: Option<String>,
    pub batch_size: i16,
    pub status: String,
    pub result_url: Option<String>,
    pub placeholder_url: Option<String>,
    pub provider_job_id: Option<String>,
    pub progress: Option<i16>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<GenerationRequestRow> for GenerationRequest {
    type Error = String;

    fn try_from(row: GenerationRequestRow) -> Result<Self, Self::Error> {
        let status: RequestStatus = row.status.parse().map_err(|e| format!("{e}"))?;
        let kind: RequestKind = row.kind.parse().map_err(|e| format!("{e}"))?;
        let batch_size = u8::try_from(row.batch_size)
            .map_err(|_| format!("batch_size {} out of range", row.batch_size))?;
        let progress = row
            .progress
            .map(|p| u8::try_from(p).map_err(|_| format!("progress {p} out of range")))
            .transpose()?;

        Ok(GenerationRequest {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_email: row.user_email,
            kind,
            prompt: row.prompt,
            aspect_ratio: row.aspect_ratio,
            reference_image: row.reference_image,
            style: row.style,
            batch_size,
            status,
            result_url: row.result_url,
            placeholder_url: row.placeholder_url,
            provider_job_id: row.provider_job_id,
            progress,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}
