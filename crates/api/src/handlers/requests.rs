//! Handlers for the `/requests` resource.
//!
//! All endpoints require authentication via [`AuthUser`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use brandgen_core::request::{GenerationRequest, NewGenerationRequest};
use brandgen_core::types::RequestId;
use brandgen_events::NotificationEvent;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /requests/{id}/retry`.
#[derive(Debug, Serialize)]
pub struct RetryAccepted {
    pub request_id: RequestId,
    pub prompt: String,
}

/// POST /api/v1/requests
///
/// Create a request and submit it to the provider. Responds 201 with the
/// request as it stands after submission (`in-progress` or `failed`).
pub async fn create_request(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<NewGenerationRequest>,
) -> AppResult<impl IntoResponse> {
    let request = state.generation.submit(&auth.requester(), input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: request })))
}

/// GET /api/v1/requests
///
/// The caller's requests, most recent first.
pub async fn list_my_requests(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<GenerationRequest>>>> {
    let requests = state.lifecycle.list_requests_for_user(auth.user_id).await?;
    Ok(Json(DataResponse { data: requests }))
}

/// GET /api/v1/requests/{id}
pub async fn get_request(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> AppResult<Json<DataResponse<GenerationRequest>>> {
    let request = state.lifecycle.get_request(id).await?;
    auth.ensure_can_access(&request)?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/requests/{id}/retry
///
/// Publish a `generation-retry` signal for the request. The generation
/// service picks it up: an `in-progress` request is polled again, anything
/// else is re-generated as a new request. Responds 202.
pub async fn retry_request(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> AppResult<impl IntoResponse> {
    let request = state.lifecycle.get_request(id).await?;
    auth.ensure_can_access(&request)?;

    tracing::info!(request_id = %id, user_id = %auth.user_id, "Retry requested");
    state
        .notifier
        .publish(NotificationEvent::generation_retry(Some(id), request.prompt.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RetryAccepted {
                request_id: id,
                prompt: request.prompt,
            },
        }),
    ))
}
