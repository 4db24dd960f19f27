//! Handlers for `/admin/requests`: the review queue and manual fulfillment.
//!
//! All endpoints require the admin role via [`RequireAdmin`].

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use brandgen_core::request::{GenerationRequest, RequestStatus};
use brandgen_core::types::RequestId;
use brandgen_pipeline::admin::ClearConfirmation;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// Query / request / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /admin/requests`.
#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub status: Option<RequestStatus>,
}

/// Body of `PATCH /admin/requests/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct SetStatusBody {
    pub status: RequestStatus,
    pub result_url: Option<String>,
}

/// Query parameters for `DELETE /admin/requests`.
#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadedResult {
    pub request: GenerationRequest,
    pub artifact_key: String,
    pub artifact_url: String,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/requests?status=
///
/// Every request, most recent first, optionally filtered by status.
pub async fn list_queue(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<QueueQuery>,
) -> AppResult<Json<DataResponse<Vec<GenerationRequest>>>> {
    let queue = state.admin.queue(params.status).await?;
    Ok(Json(DataResponse { data: queue }))
}

/// PATCH /api/v1/admin/requests/{id}/status
pub async fn set_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Json(body): Json<SetStatusBody>,
) -> AppResult<Json<DataResponse<GenerationRequest>>> {
    tracing::debug!(request_id = %id, admin = %admin.user_id, "Admin status update");
    let request = state
        .admin
        .set_status(id, body.status, body.result_url.as_deref())
        .await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/admin/requests/{id}/result
///
/// Multipart upload with a `file` field. The file is stored by content
/// address and the request completed with its URL.
pub async fn upload_result(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<UploadedResult>>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no content type".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) = upload
        .ok_or_else(|| AppError::BadRequest(format!("Missing '{UPLOAD_FIELD}' field")))?;

    let (request, artifact) = state.admin.attach_result(id, &bytes, &content_type).await?;
    Ok(Json(DataResponse {
        data: UploadedResult {
            request,
            artifact_key: artifact.key,
            artifact_url: artifact.url,
        },
    }))
}

/// DELETE /api/v1/admin/requests?confirm=true
///
/// Remove every request. Without `confirm=true` nothing is deleted and the
/// call fails validation.
pub async fn clear_all(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<ClearQuery>,
) -> AppResult<Json<DataResponse<Cleared>>> {
    let deleted = state
        .admin
        .clear_all(ClearConfirmation::from(params.confirm))
        .await?;
    tracing::warn!(admin = %admin.user_id, deleted, "All requests cleared");
    Ok(Json(DataResponse {
        data: Cleared { deleted },
    }))
}
