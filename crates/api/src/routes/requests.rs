//! Route definitions for the `/requests` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::requests;
use crate::state::AppState;

/// Routes mounted at `/requests`.
///
/// ```text
/// POST   /              -> create_request
/// GET    /              -> list_my_requests
/// GET    /{id}          -> get_request
/// POST   /{id}/retry    -> retry_request
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(requests::create_request).get(requests::list_my_requests),
        )
        .route("/{id}", get(requests::get_request))
        .route("/{id}/retry", post(requests::retry_request))
}
