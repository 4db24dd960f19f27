//! Repository for the `generation_requests` table.
//!
//! Status values are written from [`RequestStatus::as_str`]; transition
//! legality is checked by the caller before any write reaches this layer.

use brandgen_core::request::{GenerationRequest, RequestStatus};
use brandgen_core::types::{RequestId, UserId};
use sqlx::PgPool;

use crate::models::generation_request::GenerationRequestRow;
use crate::store::RequestPatch;

/// Column list for `generation_requests` queries.
const COLUMNS: &str = "\
    id, user_id, user_name, user_email, kind, prompt, aspect_ratio, \
    reference_image, style, batch_size, status, result_url, placeholder_url, \
    provider_job_id, progress, error_message, created_at, updated_at, completed_at";

/// Provides CRUD operations for generation requests.
pub struct GenerationRequestRepo;

impl GenerationRequestRepo {
    /// Insert a freshly created request.
    pub async fn insert(pool: &PgPool, req: &GenerationRequest) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generation_requests \
             (id, user_id, user_name, user_email, kind, prompt, aspect_ratio, \
              reference_image, style, batch_size, status, result_url, placeholder_url, \
              provider_job_id, progress, error_message, created_at, updated_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(req.id)
        .bind(req.user_id)
        .bind(&req.user_name)
        .bind(&req.user_email)
        .bind(req.kind.as_str())
        .bind(&req.prompt)
        .bind(&req.aspect_ratio)
        .bind(&req.reference_image)
        .bind(&req.style)
        .bind(i16::from(req.batch_size))
        .bind(req.status.as_str())
        .bind(&req.result_url)
        .bind(&req.placeholder_url)
        .bind(&req.provider_job_id)
        .bind(req.progress.map(i16::from))
        .bind(&req.error_message)
        .bind(req.created_at)
        .bind(req.updated_at)
        .bind(req.completed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Overwrite the mutable columns of one request whose status is still
    /// `expected`.
    ///
    /// Returns the updated row, or `None` if the id does not exist or its
    /// status has moved on.
    pub async fn update_by_id(
        pool: &PgPool,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<GenerationRequestRow>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_requests \
             SET status = $2, result_url = $3, placeholder_url = $4, provider_job_id = $5, \
                 progress = $6, error_message = $7, updated_at = $8, completed_at = $9 \
             WHERE id = $1 AND status = $10 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationRequestRow>(&query)
            .bind(id)
            .bind(patch.status.as_str())
            .bind(&patch.result_url)
            .bind(&patch.placeholder_url)
            .bind(&patch.provider_job_id)
            .bind(patch.progress.map(i16::from))
            .bind(&patch.error_message)
            .bind(patch.updated_at)
            .bind(patch.completed_at)
            .bind(expected.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Find a request by id.
    pub async fn find_by_id(
        pool: &PgPool,
        id: RequestId,
    ) -> Result<Option<GenerationRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_requests WHERE id = $1");
        sqlx::query_as::<_, GenerationRequestRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All requests, most recent first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<GenerationRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_requests ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, GenerationRequestRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// One user's requests, most recent first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<GenerationRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_requests \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, GenerationRequestRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Remove every request. Returns how many rows were removed.
    ///
    /// Uses `TRUNCATE` so the change feed emits a single "cleared" notice
    /// instead of one per row.
    pub async fn delete_all(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generation_requests")
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("TRUNCATE generation_requests")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
