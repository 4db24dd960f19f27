//! Route definitions for `/admin/requests`. Admin role required.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use brandgen_core::storage::MAX_ARTIFACT_BYTES;

use crate::handlers::admin;
use crate::state::AppState;

/// Headroom for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Routes mounted at `/admin`.
///
/// ```text
/// GET    /requests?status=        -> list_queue
/// DELETE /requests?confirm=true   -> clear_all
/// PATCH  /requests/{id}/status    -> set_status
/// POST   /requests/{id}/result    -> upload_result (multipart)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/requests",
            get(admin::list_queue).delete(admin::clear_all),
        )
        .route("/requests/{id}/status", patch(admin::set_status))
        .route(
            "/requests/{id}/result",
            post(admin::upload_result)
                .layer(DefaultBodyLimit::max(MAX_ARTIFACT_BYTES + MULTIPART_OVERHEAD)),
        )
}
